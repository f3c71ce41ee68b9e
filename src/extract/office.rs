use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use roxmltree::{Document, Node};
use zip::result::ZipError;
use zip::ZipArchive;

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Column count of a worksheet (`A` through `XFD`).
const MAX_COLUMNS: usize = 16_384;

/// Body paragraphs of a word-processor document, one per line.
pub fn extract_docx_text(path: &Path) -> Result<String> {
    let mut archive = open_archive(path, "DOCX")?;
    let document_xml = read_entry(&mut archive, "word/document.xml")?;
    let doc = Document::parse(&document_xml).context("failed to parse DOCX XML")?;

    let Some(body) = doc.descendants().find(|node| is_element(node, "body")) else {
        return Ok(String::new());
    };

    let mut text = String::new();
    for paragraph in body.children().filter(|node| is_element(node, "p")) {
        text.push_str(&paragraph_text(paragraph));
        text.push('\n');
    }

    Ok(text)
}

fn paragraph_text(paragraph: Node) -> String {
    let mut text = String::new();
    for node in paragraph.descendants().filter(|node| node.is_element()) {
        let in_run = node
            .parent()
            .map(|parent| is_element(&parent, "r"))
            .unwrap_or(false);
        if !in_run {
            continue;
        }

        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or_default()),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

/// Every worksheet as a `--- Sheet: name ---` header followed by tab-joined rows.
///
/// Stops after the row that takes the output past `budget` bytes.
pub fn extract_xlsx_text(path: &Path, budget: usize) -> Result<String> {
    let mut archive = open_archive(path, "XLSX")?;

    let shared_strings = match read_optional_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let workbook_xml = read_entry(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_entry(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let relationships = parse_relationships(&rels_xml, "xl")?;

    let workbook = Document::parse(&workbook_xml).context("failed to parse xl/workbook.xml")?;
    let sheets: Vec<(String, String)> = workbook
        .descendants()
        .filter(|node| is_element(node, "sheet"))
        .filter_map(|node| {
            let name = node.attribute("name")?;
            let rel_id = node.attribute((REL_NS, "id"))?;
            Some((name.to_string(), rel_id.to_string()))
        })
        .collect();

    let mut text = String::new();
    for (name, rel_id) in sheets {
        let target = relationships
            .get(&rel_id)
            .with_context(|| format!("workbook has no relationship {rel_id} for sheet {name}"))?;
        let sheet_xml = read_entry(&mut archive, target)?;

        text.push_str(&format!("--- Sheet: {name} ---\n"));
        write_sheet_rows(&sheet_xml, &shared_strings, &mut text, budget)
            .with_context(|| format!("failed to read sheet {name}"))?;
        text.push('\n');
        if text.len() >= budget {
            tracing::debug!(path = %path.display(), budget, "workbook text truncated");
            break;
        }
    }

    Ok(text)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let doc = Document::parse(xml).context("failed to parse xl/sharedStrings.xml")?;
    let strings = doc
        .root_element()
        .children()
        .filter(|node| is_element(node, "si"))
        .map(|item| {
            item.descendants()
                .filter(|node| is_element(node, "t"))
                .filter_map(|node| node.text())
                .collect::<String>()
        })
        .collect();
    Ok(strings)
}

/// Appends one tab-joined line per `<row>` present in the sheet. Cells are
/// placed by their column reference, with empty strings for skipped columns.
fn write_sheet_rows(
    xml: &str,
    shared_strings: &[String],
    out: &mut String,
    budget: usize,
) -> Result<()> {
    let doc = Document::parse(xml).context("failed to parse worksheet XML")?;

    for row in doc.descendants().filter(|node| is_element(node, "row")) {
        let mut line: Vec<String> = Vec::new();
        for cell in row.children().filter(|node| is_element(node, "c")) {
            let col_idx = match cell.attribute("r") {
                Some(reference) => column_index(reference)
                    .with_context(|| format!("invalid cell reference {reference:?}"))?,
                None => line.len(),
            };
            if col_idx >= MAX_COLUMNS {
                anyhow::bail!("cell column {} exceeds the sheet width", col_idx + 1);
            }
            if col_idx >= line.len() {
                line.resize(col_idx + 1, String::new());
            }
            line[col_idx] = cell_value(cell, shared_strings);
        }

        out.push_str(&line.join("\t"));
        out.push('\n');
        if out.len() >= budget {
            break;
        }
    }

    Ok(())
}

fn cell_value(cell: Node, shared_strings: &[String]) -> String {
    let raw = cell
        .children()
        .find(|node| is_element(node, "v"))
        .and_then(|node| node.text())
        .unwrap_or_default();

    match cell.attribute("t") {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => cell
            .descendants()
            .filter(|node| is_element(node, "t"))
            .filter_map(|node| node.text())
            .collect(),
        Some("b") => match raw.trim() {
            "1" => "True".to_string(),
            "0" => "False".to_string(),
            _ => String::new(),
        },
        _ => raw.to_string(),
    }
}

/// Zero-based column of an A1-style reference (`"C7"` is 2).
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }

    let one_based = letters.chars().try_fold(0usize, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)
    })?;
    Some(one_based - 1)
}

/// Every slide as `--- Slide n ---` followed by the text of its shapes.
pub fn extract_pptx_text(path: &Path) -> Result<String> {
    let mut archive = open_archive(path, "PPTX")?;

    let presentation_xml = read_entry(&mut archive, "ppt/presentation.xml")?;
    let rels_xml = read_entry(&mut archive, "ppt/_rels/presentation.xml.rels")?;
    let relationships = parse_relationships(&rels_xml, "ppt")?;

    let presentation =
        Document::parse(&presentation_xml).context("failed to parse ppt/presentation.xml")?;
    let slide_ids: Vec<String> = presentation
        .descendants()
        .filter(|node| is_element(node, "sldId"))
        .filter_map(|node| node.attribute((REL_NS, "id")).map(str::to_string))
        .collect();

    let mut text = String::new();
    for (index, rel_id) in slide_ids.iter().enumerate() {
        let target = relationships
            .get(rel_id)
            .with_context(|| format!("presentation has no relationship {rel_id}"))?;
        let slide_xml = read_entry(&mut archive, target)?;
        let slide = Document::parse(&slide_xml)
            .with_context(|| format!("failed to parse slide {}", index + 1))?;

        text.push_str(&format!("--- Slide {} ---\n", index + 1));
        if let Some(tree) = slide.descendants().find(|node| is_element(node, "spTree")) {
            for shape in tree.children().filter(|node| is_element(node, "sp")) {
                text.push_str(&shape_text(shape));
                text.push('\n');
            }
        }
        text.push('\n');
    }

    Ok(text)
}

fn shape_text(shape: Node) -> String {
    let Some(body) = shape.children().find(|node| is_element(node, "txBody")) else {
        return String::new();
    };

    body.children()
        .filter(|node| is_element(node, "p"))
        .map(|paragraph| {
            paragraph
                .descendants()
                .filter(|node| node.is_element())
                .filter_map(|node| match node.tag_name().name() {
                    "t" => node.text(),
                    "br" => Some("\n"),
                    _ => None,
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Relationship id to archive entry name, resolved against `base_dir`.
fn parse_relationships(xml: &str, base_dir: &str) -> Result<HashMap<String, String>> {
    let doc = Document::parse(xml).context("failed to parse relationships XML")?;
    let map = doc
        .descendants()
        .filter(|node| is_element(node, "Relationship"))
        .filter_map(|node| {
            let id = node.attribute("Id")?;
            let target = node.attribute("Target")?;
            let entry = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("{base_dir}/{target}"),
            };
            Some((id.to_string(), entry))
        })
        .collect();
    Ok(map)
}

fn open_archive(path: &Path, kind: &str) -> Result<ZipArchive<File>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {kind}: {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("{kind} is not a valid ZIP archive"))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    read_optional_entry(archive, name)?.with_context(|| format!("archive missing {name}"))
}

fn read_optional_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed to open {name}")),
    };

    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .with_context(|| format!("failed to read {name}"))?;
    Ok(Some(contents))
}

fn is_element(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}
