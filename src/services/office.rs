//! Text extraction for Office Open XML documents (docx, pptx, xlsx).

use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use docx_rs::{
    read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent,
    TableChild, TableRowChild,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use super::html::decode_entities;

/// Last addressable column (XFD) and row of an Excel sheet.
const MAX_COLUMNS: u32 = 16_384;
const MAX_ROWS: u32 = 1_048_576;

static SLIDE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?p(?:\s[^>]*)?>.*?</(?:\w+:)?p>").expect("valid regex")
});
static SLIDE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?t(?:\s[^>]*)?>([^<]*)</(?:\w+:)?t>").expect("valid regex")
});
static SLIDE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid regex"));

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    let render = |row: &Vec<String>| {
        let cells: Vec<String> = (0..width)
            .map(|i| escape_cell(row.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = vec![render(&rows[0])];
    lines.push(format!("|{}", " --- |".repeat(width)));
    lines.extend(rows[1..].iter().map(render));
    lines.join("\n")
}

fn collect_run_text(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for part in &run.children {
                    match part {
                        RunChild::Text(text) => out.push_str(&text.text),
                        RunChild::Tab(_) => out.push('\t'),
                        RunChild::Break(_) => out.push('\n'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => collect_run_text(&link.children, out),
            _ => {}
        }
    }
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    collect_run_text(&paragraph.children, &mut text);
    decode_entities(text.trim())
}

/// "Heading2" / "heading 2" -> 2, "Title" -> 1.
fn heading_level(style: &str) -> Option<usize> {
    if style.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let level = style
        .strip_prefix("Heading")
        .or_else(|| style.strip_prefix("heading"))?;
    level.trim().parse::<usize>().ok().map(|l| l.clamp(1, 6))
}

fn paragraph_block(paragraph: &Paragraph) -> Option<String> {
    let text = paragraph_text(paragraph);
    if text.is_empty() {
        return None;
    }

    let style = paragraph.property.style.as_ref().map(|s| s.val.as_str());
    let block = if let Some(level) = style.and_then(heading_level) {
        format!("{} {}", "#".repeat(level), text)
    } else if paragraph.property.numbering_property.is_some() {
        format!("- {}", text)
    } else {
        text
    };
    Some(block)
}

fn table_rows(table: &Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in &table.rows {
        #[allow(irrefutable_let_patterns)]
        let TableChild::TableRow(row) = row
        else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            #[allow(irrefutable_let_patterns)]
            let TableRowChild::TableCell(cell) = cell
            else {
                continue;
            };
            let text: Vec<String> = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .filter(|t| !t.is_empty())
                .collect();
            cells.push(text.join(" "));
        }
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push(cells);
        }
    }
    rows
}

pub fn docx_to_markdown(bytes: &[u8]) -> Result<String> {
    let docx = read_docx(bytes).context("Not a valid docx document")?;

    let mut blocks = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => blocks.extend(paragraph_block(paragraph)),
            DocumentChild::Table(table) => {
                let rows = table_rows(table);
                if !rows.is_empty() {
                    blocks.push(markdown_table(&rows));
                }
            }
            _ => {}
        }
    }

    Ok(blocks.join("\n\n"))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open '{}'", name)),
    };
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read '{}'", name))?;
    Ok(Some(xml))
}

pub fn pptx_to_markdown(bytes: &[u8]) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Not a valid Office Open XML package")?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = SLIDE_NAME.captures(name)?[1].parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut sections = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_entry(&mut archive, &name)?.unwrap_or_default();
        let lines: Vec<String> = SLIDE_PARAGRAPH
            .find_iter(&xml)
            .map(|p| {
                let text: String = SLIDE_TEXT
                    .captures_iter(p.as_str())
                    .map(|c| c[1].to_string())
                    .collect();
                decode_entities(text.trim())
            })
            .filter(|line| !line.is_empty())
            .collect();
        sections.push(format!(
            "<!-- Slide number: {} -->\n{}",
            number,
            lines.join("\n")
        ));
    }

    Ok(sections.join("\n\n"))
}

/// Non-empty rows of one sheet, densified per row. Cells outside Excel's
/// grid are dropped so a forged reference cannot size the table.
fn sheet_rows<RS: Read + Seek>(workbook: &mut Xlsx<RS>, sheet: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = workbook
        .worksheet_cells_reader(sheet)
        .with_context(|| format!("Failed to open sheet '{}'", sheet))?;

    let mut rows: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut out_of_bounds = 0usize;
    while let Some(cell) = reader
        .next_cell()
        .with_context(|| format!("Failed to read sheet '{}'", sheet))?
    {
        let (row, column) = cell.get_position();
        if row >= MAX_ROWS || column >= MAX_COLUMNS {
            out_of_bounds += 1;
            continue;
        }
        let value = Data::from(cell.get_value().clone()).to_string();
        if value.is_empty() {
            continue;
        }

        let cells = rows.entry(row).or_default();
        let column = column as usize;
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value;
    }

    if out_of_bounds > 0 {
        warn!(
            sheet = sheet,
            cells = out_of_bounds,
            "Ignored cells outside the sheet grid"
        );
    }
    Ok(rows.into_values().collect())
}

pub fn xlsx_to_markdown(bytes: &[u8]) -> Result<String> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).context("Not a valid xlsx workbook")?;

    let names = workbook.sheet_names();
    debug!(sheets = names.len(), "Reading workbook");

    let mut sections = Vec::with_capacity(names.len());
    for name in names {
        let rows = sheet_rows(&mut workbook, &name)?;
        sections.push(format!("## {}\n{}", name, markdown_table(&rows)));
    }

    Ok(sections.join("\n\n"))
}
