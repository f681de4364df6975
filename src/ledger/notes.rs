use crate::dates::timestamp_sort_key;
use crate::models::{same_document_number, Note};

/// Append-only annotations for every document in the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteLedger {
    entries: Vec<Note>,
}

impl NoteLedger {
    pub fn new(entries: Vec<Note>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Note] {
        &self.entries
    }

    pub fn get(&self, note_id: &str) -> Option<&Note> {
        self.entries.iter().find(|note| note.id == note_id)
    }

    /// Notes for one document in append order.
    pub fn notes_for<'a>(&'a self, document_number: &'a str) -> impl Iterator<Item = &'a Note> + 'a {
        self.entries
            .iter()
            .filter(move |note| same_document_number(&note.document_number, document_number))
    }

    pub fn count_for(&self, document_number: &str) -> usize {
        self.notes_for(document_number).count()
    }

    pub fn authored_by(&self, document_number: &str, author: &str) -> bool {
        self.notes_for(document_number)
            .any(|note| note.author.trim().eq_ignore_ascii_case(author.trim()))
    }

    /// Pending notes win over confirmed ones whatever their timestamp; then the
    /// newest timestamp; then the later append.
    pub fn latest_note(&self, document_number: &str) -> Option<&Note> {
        self.entries
            .iter()
            .filter(|note| same_document_number(&note.document_number, document_number))
            .enumerate()
            .max_by_key(|(position, note)| (note.pending, timestamp_sort_key(&note.timestamp), *position))
            .map(|(_, note)| note)
    }

    /// Appends a local echo. The entry is always stored as pending.
    pub fn add_note(&mut self, mut note: Note) -> &Note {
        note.pending = true;
        self.entries.push(note);
        let last = self.entries.len() - 1;
        &self.entries[last]
    }

    pub fn confirm(&mut self, note_id: &str) -> bool {
        match self.entries.iter_mut().find(|note| note.id == note_id) {
            Some(note) => {
                note.pending = false;
                true
            }
            None => false,
        }
    }

    /// Removes a single entry, returning it with its position so a failed
    /// delete can put it back where it was.
    pub fn remove(&mut self, note_id: &str) -> Option<(usize, Note)> {
        let position = self.entries.iter().position(|note| note.id == note_id)?;
        Some((position, self.entries.remove(position)))
    }

    pub fn restore(&mut self, position: usize, note: Note) {
        let position = position.min(self.entries.len());
        self.entries.insert(position, note);
    }
}
