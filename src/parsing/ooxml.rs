//! Text extraction for Office Open XML packages (`.docx`, `.pptx`).
//!
//! Both formats are zip archives of XML parts. Only the parts that hold body text are read:
//! `word/document.xml` for documents and `ppt/slides/slideN.xml` for decks.

use super::ExtractionErrorKind;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";
const SLIDE_SUFFIX: &str = ".xml";
/// Soft line break inside a slide paragraph; `\n` stays reserved for paragraph boundaries.
const LINE_BREAK: char = '\u{b}';

/// Body paragraphs of a word-processing document joined by newlines.
pub(super) fn extract_docx(path: &Path) -> Result<String, ExtractionErrorKind> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let xml = read_part(&mut archive, DOCUMENT_PART)?;
    Ok(docx_paragraphs(&xml)?.join("\n"))
}

/// Text of every top-level shape on every slide, each followed by a newline.
pub(super) fn extract_pptx(path: &Path) -> Result<String, ExtractionErrorKind> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(SLIDE_PREFIX)?
                .strip_suffix(SLIDE_SUFFIX)?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut text = String::new();
    for (_, name) in slides {
        let xml = read_part(&mut archive, &name)?;
        for shape in slide_shape_texts(&xml)? {
            text.push_str(&shape);
            text.push('\n');
        }
    }
    Ok(text)
}

fn read_part(archive: &mut ZipArchive<File>, name: &str) -> Result<String, ExtractionErrorKind> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Collect the paragraphs that are direct children of `w:body`.
///
/// Only runs of the paragraph itself (or of its hyperlinks) contribute text, so tab-stop
/// definitions in `w:pPr` and text-box content nested inside a run are left out.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut paragraph_depth = 0;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let name = element.name().as_ref().to_vec();
                match name.as_slice() {
                    b"w:p" if parent_is(&open, b"w:body") => {
                        current = Some(String::new());
                        paragraph_depth = open.len();
                    }
                    b"w:t" => {
                        in_text = current.is_some() && in_paragraph_run(&open, paragraph_depth);
                    }
                    _ => {}
                }
                open.push(name);
            }
            Event::Empty(element) => {
                let in_run = current.is_some() && in_paragraph_run(&open, paragraph_depth);
                match element.name().as_ref() {
                    b"w:p" if parent_is(&open, b"w:body") => paragraphs.push(String::new()),
                    b"w:tab" if in_run => push_char(&mut current, '\t'),
                    b"w:br" | b"w:cr" if in_run => push_char(&mut current, '\n'),
                    _ => {}
                }
            }
            Event::Text(content) if in_text => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push_str(&content.unescape()?);
                }
            }
            Event::End(element) => {
                open.pop();
                match element.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" if parent_is(&open, b"w:body") => {
                        if let Some(paragraph) = current.take() {
                            paragraphs.push(paragraph);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Text of each shape that sits directly in the slide's shape tree.
///
/// Shapes inside groups, pictures, connectors and tables carry no text of their own and are
/// skipped. A shape without a text body contributes an empty string.
fn slide_shape_texts(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut shapes = Vec::new();
    let mut current: Option<Vec<String>> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let name = element.name().as_ref().to_vec();
                match name.as_slice() {
                    b"p:sp" if parent_is(&open, b"p:spTree") => current = Some(Vec::new()),
                    b"a:p" => {
                        if let Some(paragraphs) = current.as_mut() {
                            paragraphs.push(String::new());
                        }
                    }
                    b"a:t" => in_text = current.is_some(),
                    _ => {}
                }
                open.push(name);
            }
            Event::Empty(element) => match element.name().as_ref() {
                b"p:sp" if parent_is(&open, b"p:spTree") => shapes.push(String::new()),
                b"a:p" => {
                    if let Some(paragraphs) = current.as_mut() {
                        paragraphs.push(String::new());
                    }
                }
                b"a:br" => {
                    if let Some(paragraph) = current.as_mut().and_then(|p| p.last_mut()) {
                        paragraph.push(LINE_BREAK);
                    }
                }
                _ => {}
            },
            Event::Text(content) if in_text => {
                if let Some(paragraph) = current.as_mut().and_then(|p| p.last_mut()) {
                    paragraph.push_str(&content.unescape()?);
                }
            }
            Event::End(element) => {
                open.pop();
                match element.name().as_ref() {
                    b"a:t" => in_text = false,
                    b"p:sp" if parent_is(&open, b"p:spTree") => {
                        if let Some(paragraphs) = current.take() {
                            shapes.push(paragraphs.join("\n"));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}

/// Whether the innermost open element is a run of the paragraph opened at `depth`.
fn in_paragraph_run(open: &[Vec<u8>], depth: usize) -> bool {
    match open.get(depth + 1..) {
        Some([run]) => run.as_slice() == b"w:r",
        Some([link, run]) => link.as_slice() == b"w:hyperlink" && run.as_slice() == b"w:r",
        _ => false,
    }
}

fn parent_is(open: &[Vec<u8>], name: &[u8]) -> bool {
    open.last().is_some_and(|parent| parent.as_slice() == name)
}

fn push_char(target: &mut Option<String>, ch: char) {
    if let Some(text) = target.as_mut() {
        text.push(ch);
    }
}
