//! Column layouts for the sheet tabs.
//!
//! Each logical field has a list of accepted header spellings and the
//! position it occupies in the legacy layout. When a tab's header names its
//! primary key column, fields resolve by header only; otherwise the whole tab
//! is read positionally.

use super::RowSet;
use crate::dates::normalize_date;
use crate::models::{Document, GlobalParams, Note, ProcessTransition, StatusTag};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub aliases: &'static [&'static str],
    pub position: usize,
}

/// Shipment records tab.
pub mod document {
    use super::Column;

    pub const NUMBER: Column = Column {
        aliases: &["CTE", "NUMERO CTE", "DOCUMENTO", "NUMERO DOCUMENTO", "DOCUMENT", "DOCUMENT NUMBER"],
        position: 0,
    };
    pub const REVISION: Column = Column {
        aliases: &["SERIE", "SERIE CTE", "REVISAO", "REVISION", "SERIES"],
        position: 1,
    };
    pub const CODE: Column = Column {
        aliases: &["CODIGO", "COD", "CODE"],
        position: 2,
    };
    pub const ISSUE_DATE: Column = Column {
        aliases: &["DATA EMISSAO", "EMISSAO", "ISSUE DATE", "ISSUED AT"],
        position: 3,
    };
    pub const DEADLINE_DAYS: Column = Column {
        aliases: &["PRAZO BAIXA DIAS", "PRAZO BAIXA", "PRAZO DIAS", "DEADLINE DAYS"],
        position: 4,
    };
    pub const LIMIT_DATE: Column = Column {
        aliases: &["DATA LIMITE BAIXA", "DATA LIMITE", "LIMITE", "LIMIT DATE", "DUE DATE"],
        position: 5,
    };
    pub const STATUS: Column = Column {
        aliases: &["STATUS", "SITUACAO", "DECLARED STATUS"],
        position: 6,
    };
    pub const ORIGIN_UNIT: Column = Column {
        aliases: &["COLETA", "UNIDADE COLETA", "ORIGEM", "ORIGIN", "ORIGIN UNIT"],
        position: 7,
    };
    pub const DESTINATION_UNIT: Column = Column {
        aliases: &["ENTREGA", "UNIDADE DESTINO", "UNIDADE DE DESTINO", "DESTINO", "DESTINATION", "DESTINATION UNIT"],
        position: 8,
    };
    pub const VALUE: Column = Column {
        aliases: &["VALOR CTE", "VALOR", "VALUE", "AMOUNT"],
        position: 9,
    };
    pub const DELIVERY_TAX: Column = Column {
        aliases: &["TX ENTREGA", "TAXA ENTREGA", "TAXA DE ENTREGA", "DELIVERY TAX"],
        position: 10,
    };
    pub const VOLUMES: Column = Column {
        aliases: &["VOLUMES", "VOLUME", "QTD VOLUMES"],
        position: 11,
    };
    pub const WEIGHT: Column = Column {
        aliases: &["PESO", "PESO KG", "WEIGHT"],
        position: 12,
    };
    pub const PAYMENT_TYPE: Column = Column {
        aliases: &["FRETE PAGO", "TIPO FRETE", "TIPO PAGAMENTO", "PAYMENT TYPE"],
        position: 13,
    };
    pub const COUNTERPART: Column = Column {
        aliases: &["DESTINATARIO", "CLIENTE", "RECIPIENT", "COUNTERPART"],
        position: 14,
    };
    pub const JUSTIFICATION: Column = Column {
        aliases: &["JUSTIFICATIVA", "JUSTIFICATION", "OBSERVACAO"],
        position: 15,
    };
}

/// Free-text annotations tab.
pub mod note {
    use super::Column;

    pub const ID: Column = Column {
        aliases: &["ID", "ID NOTA", "NOTE ID"],
        position: 0,
    };
    pub const NUMBER: Column = Column {
        aliases: &["CTE", "DOCUMENTO", "DOCUMENT NUMBER"],
        position: 1,
    };
    pub const REVISION: Column = Column {
        aliases: &["SERIE", "REVISAO", "REVISION"],
        position: 2,
    };
    pub const TIMESTAMP: Column = Column {
        aliases: &["DATA", "DATA HORA", "TIMESTAMP", "DATE"],
        position: 4,
    };
    pub const AUTHOR: Column = Column {
        aliases: &["USUARIO", "AUTOR", "USER", "AUTHOR"],
        position: 5,
    };
    pub const TEXT: Column = Column {
        aliases: &["TEXTO", "NOTA", "ANOTACAO", "TEXT", "NOTE"],
        position: 6,
    };
    pub const ATTACHMENT: Column = Column {
        aliases: &["LINK IMAGEM", "IMAGEM", "ANEXO", "ATTACHMENT", "IMAGE LINK"],
        position: 7,
    };
    pub const TAG: Column = Column {
        aliases: &["STATUS BUSCA", "STATUS", "TAG"],
        position: 8,
    };
}

/// Process-control journal tab.
pub mod transition {
    use super::Column;

    pub const ID: Column = Column {
        aliases: &["ID", "ID PROCESSO", "TRANSITION ID"],
        position: 0,
    };
    pub const NUMBER: Column = Column {
        aliases: &["CTE", "DOCUMENTO", "DOCUMENT NUMBER"],
        position: 1,
    };
    pub const REVISION: Column = Column {
        aliases: &["SERIE", "REVISAO", "REVISION"],
        position: 2,
    };
    pub const TIMESTAMP: Column = Column {
        aliases: &["DATA", "DATA HORA", "TIMESTAMP", "DATE"],
        position: 3,
    };
    pub const ACTOR: Column = Column {
        aliases: &["USUARIO", "RESPONSAVEL", "ACTOR", "USER"],
        position: 4,
    };
    pub const DESCRIPTION: Column = Column {
        aliases: &["DESCRICAO", "DESCRIPTION", "OBSERVACAO", "TEXTO"],
        position: 5,
    };
    pub const ATTACHMENT: Column = Column {
        aliases: &["LINK", "ANEXO", "LINK IMAGEM", "ATTACHMENT"],
        position: 6,
    };
    pub const TAG: Column = Column {
        aliases: &["STATUS", "STATUS PROCESSO", "TAG"],
        position: 7,
    };
}

/// Key labels on the headerless parameters tab.
pub mod parameter {
    pub const TODAY: &[&str] = &["HOJE", "DATA HOJE", "DATA ATUAL", "TODAY", "REFERENCE TODAY"];
    pub const TOMORROW: &[&str] = &["AMANHA", "DATA AMANHA", "TOMORROW", "REFERENCE TOMORROW"];
    pub const TOLERANCE: &[&str] = &["PRAZO", "DIAS PRAZO", "TOLERANCIA", "TOLERANCE", "TOLERANCE DAYS", "DEADLINE DAYS"];
}

fn fold_accent(c: char) -> char {
    match c {
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        other => other,
    }
}

/// Upper-cases, folds Portuguese accents and collapses every run of
/// non-alphanumeric characters into one space.
pub fn normalize_header(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.trim().chars().flat_map(char::to_uppercase).map(fold_accent) {
        if c.is_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.push(c);
        } else {
            pending_space = true;
        }
    }
    normalized
}

fn matches_alias(header: &str, aliases: &[&str]) -> bool {
    aliases.iter().any(|alias| normalize_header(alias) == header)
}

/// Resolves logical columns against one tab's header row.
#[derive(Debug, Clone)]
pub struct Layout {
    header: Vec<String>,
    by_header: bool,
}

impl Layout {
    pub fn detect(header: &[String], primary_key: Column) -> Self {
        let header = header.iter().map(|cell| normalize_header(cell)).collect::<Vec<_>>();
        let by_header = header.iter().any(|cell| matches_alias(cell, primary_key.aliases));
        Self { header, by_header }
    }

    pub fn index_of(&self, column: Column) -> Option<usize> {
        if self.by_header {
            self.header.iter().position(|cell| matches_alias(cell, column.aliases))
        } else {
            Some(column.position)
        }
    }

    pub fn cell<'a>(&self, row: &'a [String], column: Column) -> &'a str {
        self.index_of(column)
            .and_then(|index| row.get(index))
            .map(|cell| cell.trim())
            .unwrap_or("")
    }
}

/// Brazilian money text such as `R$ 1.234,56`. Unparseable yields `None`.
pub fn parse_money(raw: &str) -> Option<Decimal> {
    let kept = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect::<String>();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let canonical = if kept.contains(',') {
        kept.replace('.', "").replace(',', ".")
    } else {
        kept
    };
    Decimal::from_str(&canonical).ok()
}

fn parse_count(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

fn optional_text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn split_header(rows: &RowSet) -> Option<(&[String], &[Vec<String>])> {
    let (header, body) = rows.rows.split_first()?;
    Some((header.as_slice(), body))
}

/// Returns mapped documents and the number of rows skipped for lacking a key.
pub fn map_documents(rows: &RowSet) -> (Vec<Document>, usize) {
    let Some((header, body)) = split_header(rows) else {
        return (Vec::new(), 0);
    };
    let layout = Layout::detect(header, document::NUMBER);
    let mut skipped = 0usize;
    let mut documents = Vec::with_capacity(body.len());

    for row in body {
        let number = layout.cell(row, document::NUMBER);
        if number.is_empty() {
            skipped += 1;
            continue;
        }
        documents.push(Document {
            document_number: number.to_string(),
            revision: layout.cell(row, document::REVISION).to_string(),
            code: layout.cell(row, document::CODE).to_string(),
            issue_date: normalize_date(layout.cell(row, document::ISSUE_DATE)),
            deadline_days: parse_count(layout.cell(row, document::DEADLINE_DAYS)),
            limit_date: normalize_date(layout.cell(row, document::LIMIT_DATE)),
            declared_status: layout.cell(row, document::STATUS).to_string(),
            origin_unit: layout.cell(row, document::ORIGIN_UNIT).to_string(),
            destination_unit: layout.cell(row, document::DESTINATION_UNIT).to_string(),
            counterpart: layout.cell(row, document::COUNTERPART).to_string(),
            value: parse_money(layout.cell(row, document::VALUE)).unwrap_or(Decimal::ZERO),
            delivery_tax: parse_money(layout.cell(row, document::DELIVERY_TAX)),
            volumes: parse_count(layout.cell(row, document::VOLUMES)),
            weight: parse_money(layout.cell(row, document::WEIGHT)),
            payment_type: layout.cell(row, document::PAYMENT_TYPE).to_string(),
            justification: layout.cell(row, document::JUSTIFICATION).to_string(),
        });
    }

    (documents, skipped)
}

pub fn map_notes(rows: &RowSet) -> (Vec<Note>, usize) {
    let Some((header, body)) = split_header(rows) else {
        return (Vec::new(), 0);
    };
    let layout = Layout::detect(header, note::ID);
    let mut skipped = 0usize;
    let mut notes = Vec::with_capacity(body.len());

    for row in body {
        let id = layout.cell(row, note::ID);
        let number = layout.cell(row, note::NUMBER);
        if id.is_empty() || number.is_empty() {
            skipped += 1;
            continue;
        }
        notes.push(Note {
            id: id.to_string(),
            document_number: number.to_string(),
            revision: layout.cell(row, note::REVISION).to_string(),
            timestamp: layout.cell(row, note::TIMESTAMP).to_string(),
            author: layout.cell(row, note::AUTHOR).to_string(),
            text: layout.cell(row, note::TEXT).to_string(),
            attachment: optional_text(layout.cell(row, note::ATTACHMENT)),
            tag: StatusTag::parse(layout.cell(row, note::TAG)),
            pending: false,
        });
    }

    (notes, skipped)
}

/// Journal rows without a recognised status tag are skipped: a transition
/// always names the state it moves to.
pub fn map_transitions(rows: &RowSet) -> (Vec<ProcessTransition>, usize) {
    let Some((header, body)) = split_header(rows) else {
        return (Vec::new(), 0);
    };
    let layout = Layout::detect(header, transition::NUMBER);
    let mut skipped = 0usize;
    let mut transitions = Vec::with_capacity(body.len());

    for (index, row) in body.iter().enumerate() {
        let number = layout.cell(row, transition::NUMBER);
        let tag = StatusTag::parse(layout.cell(row, transition::TAG));
        let (false, Some(tag)) = (number.is_empty(), tag) else {
            skipped += 1;
            continue;
        };
        let id = layout.cell(row, transition::ID);
        transitions.push(ProcessTransition {
            id: if id.is_empty() { format!("row-{}", index + 1) } else { id.to_string() },
            document_number: number.to_string(),
            revision: layout.cell(row, transition::REVISION).to_string(),
            timestamp: layout.cell(row, transition::TIMESTAMP).to_string(),
            actor: layout.cell(row, transition::ACTOR).to_string(),
            description: layout.cell(row, transition::DESCRIPTION).to_string(),
            attachment: optional_text(layout.cell(row, transition::ATTACHMENT)),
            tag,
        });
    }

    (transitions, skipped)
}

fn parameter_value<'a>(rows: &'a RowSet, keys: &[&str], position: usize) -> &'a str {
    let labelled = rows.rows.iter().find(|row| {
        row.first()
            .map(|label| matches_alias(&normalize_header(label), keys))
            .unwrap_or(false)
    });
    labelled
        .or_else(|| rows.rows.get(position))
        .and_then(|row| row.get(1))
        .map(|cell| cell.trim())
        .unwrap_or("")
}

pub fn map_params(rows: &RowSet, fallback_today: NaiveDate, default_tolerance_days: u32) -> GlobalParams {
    let reference_today = normalize_date(parameter_value(rows, parameter::TODAY, 0)).unwrap_or(fallback_today);
    let reference_tomorrow = normalize_date(parameter_value(rows, parameter::TOMORROW, 1))
        .or_else(|| reference_today.checked_add_days(Days::new(1)))
        .unwrap_or(reference_today);
    let tolerance_days = parse_count(parameter_value(rows, parameter::TOLERANCE, 2)).unwrap_or(default_tolerance_days);

    GlobalParams {
        reference_today,
        reference_tomorrow,
        tolerance_days,
    }
}

#[cfg(test)]
mod tests {
    use super::{map_documents, map_notes, map_params, map_transitions, normalize_header, parse_money};
    use crate::feed::RowSet;
    use crate::models::StatusTag;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn header_normalization_folds_case_accents_and_separators() {
        assert_eq!(normalize_header(" Data_Limite_Baixa "), "DATA LIMITE BAIXA");
        assert_eq!(normalize_header("Unidade de Destino"), "UNIDADE DE DESTINO");
        assert_eq!(normalize_header("destinatário"), "DESTINATARIO");
        assert_eq!(normalize_header("AMANHÃ"), "AMANHA");
    }

    #[test]
    fn money_accepts_brazilian_format() {
        assert_eq!(parse_money("R$ 1.234,56"), Some(Decimal::from_str("1234.56").expect("decimal")));
        assert_eq!(parse_money("89.9"), Some(Decimal::from_str("89.9").expect("decimal")));
        assert_eq!(parse_money("-"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn documents_resolve_by_aliased_header_in_any_order() {
        let rows = RowSet::from_strs(&[
            &["Unidade de Destino", "cte", "Série", "Data Limite", "Valor", "Status"],
            &["CWB", "1001", "06", "05/03/2024", "R$ 10,50", "EM BUSCA"],
            &["CWB", "", "1", "05/03/2024", "1", ""],
        ]);
        let (documents, skipped) = map_documents(&rows);
        assert_eq!(skipped, 1);
        assert_eq!(documents.len(), 1);
        let doc = &documents[0];
        assert_eq!(doc.document_number, "1001");
        assert_eq!(doc.revision, "06");
        assert_eq!(doc.destination_unit, "CWB");
        assert_eq!(doc.limit_date, Some(ymd(2024, 3, 5)));
        assert_eq!(doc.value, Decimal::from_str("10.50").expect("decimal"));
        assert!(doc.declared_searching());
        assert!(doc.payment_type.is_empty());
    }

    #[test]
    fn unknown_header_falls_back_to_legacy_positions() {
        let rows = RowSet::from_strs(&[
            &["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "c9"],
            &["2002", "1", "X", "01/03/2024", "3", "45000", "", "SAO", "POA", "99,00"],
        ]);
        let (documents, _) = map_documents(&rows);
        assert_eq!(documents[0].document_number, "2002");
        assert_eq!(documents[0].destination_unit, "POA");
        assert_eq!(documents[0].limit_date, Some(ymd(2023, 3, 15)));
        assert_eq!(documents[0].deadline_days, Some(3));
    }

    #[test]
    fn notes_and_transitions_skip_rows_without_keys() {
        let notes = RowSet::from_strs(&[
            &["ID", "CTE", "SERIE", "CODIGO", "DATA", "USUARIO", "TEXTO", "LINK_IMAGEM", "STATUS_BUSCA"],
            &["1", "1001", "6", "A", "01/03/2024 10:00", "ana", "sumiu", " ", "EM BUSCA"],
            &["", "1001", "6", "A", "01/03/2024 10:00", "ana", "sem id", "", ""],
        ]);
        let (notes, skipped) = map_notes(&notes);
        assert_eq!((notes.len(), skipped), (1, 1));
        assert_eq!(notes[0].tag, Some(StatusTag::Searching));
        assert!(notes[0].attachment.is_none());

        let transitions = RowSet::from_strs(&[
            &["Documento", "Série", "Status", "Descrição"],
            &["1001", "6", "EM BUSCA", "início"],
            &["1001", "6", "", "sem status"],
            &["", "6", "TAD", "sem documento"],
        ]);
        let (transitions, skipped) = map_transitions(&transitions);
        assert_eq!((transitions.len(), skipped), (1, 2));
        assert_eq!(transitions[0].id, "row-1");
        assert_eq!(transitions[0].description, "início");
    }

    #[test]
    fn params_by_label_or_position_with_fallbacks() {
        let labelled = RowSet::from_strs(&[&["Prazo", "3"], &["Hoje", "05/03/2024"], &["Amanhã", "08/03/2024"]]);
        let params = map_params(&labelled, ymd(2030, 1, 1), 0);
        assert_eq!(params.reference_today, ymd(2024, 3, 5));
        assert_eq!(params.reference_tomorrow, ymd(2024, 3, 8));
        assert_eq!(params.tolerance_days, 3);

        let positional = RowSet::from_strs(&[&["x", "05/03/2024"], &["y", ""], &["z", "abc"]]);
        let params = map_params(&positional, ymd(2030, 1, 1), 0);
        assert_eq!(params.reference_tomorrow, ymd(2024, 3, 6));
        assert_eq!(params.tolerance_days, 0);

        let empty = map_params(&RowSet::default(), ymd(2030, 1, 1), 1);
        assert_eq!(empty.reference_today, ymd(2030, 1, 1));
        assert_eq!(empty.tolerance_days, 1);
    }
}
