//! Word-processor documents: `.docx` via the OOXML package, `.doc` via antiword.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::ExtractFailure;

/// Paragraph text of `word/document.xml`, one line per non-empty paragraph.
pub(crate) fn extract_docx(path: &Path) -> Result<String, ExtractFailure> {
    let file = File::open(path).map_err(|e| ExtractFailure::Read(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractFailure::Docx(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractFailure::Docx(format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractFailure::Docx(e.to_string()))?;

    document_text(&xml)
}

fn document_text(xml: &str) -> Result<String, ExtractFailure> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| ExtractFailure::Docx(err.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractFailure::Docx(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

/// Dump a legacy `.doc` with the external `antiword` tool.
pub(crate) fn extract_doc(path: &Path, antiword_cmd: &str) -> Result<String, ExtractFailure> {
    let output = Command::new(antiword_cmd)
        .arg(path)
        .output()
        .map_err(|e| ExtractFailure::Command {
            command: antiword_cmd.to_string(),
            message: e.to_string(),
        })?;

    let text: String = String::from_utf8_lossy(&output.stdout)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();

    if !output.status.success() && text.trim().is_empty() {
        return Err(ExtractFailure::Command {
            command: antiword_cmd.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(text)
}
