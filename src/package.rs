/// In-memory PPTX package backed by the template's ZIP container.
///
/// A `.pptx` file is an OPC package: a ZIP archive of XML "parts" wired
/// together by relationship parts (`.rels`) and a content-type map. This
/// module keeps every part as raw bytes, in archive order, and offers just
/// enough of the package model for slide lookup and insertion: part
/// get/replace/add, relationship resolution, and serialization back to ZIP.
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{PptxError, Result};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub struct PptxPackage {
    /// Parts in original archive order; new parts are appended.
    parts: Vec<(String, Vec<u8>)>,
}

impl PptxPackage {
    /// Open a package from a `.pptx` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a package from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut blob = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut blob)?;
            parts.push((entry.name().to_string(), blob));
        }
        Ok(Self { parts })
    }

    /// Get a part's bytes by archive name (e.g. `ppt/presentation.xml`).
    pub fn part(&self, name: &str) -> Result<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, blob)| blob.as_slice())
            .ok_or_else(|| PptxError::PartNotFound(name.to_string()))
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    /// Replace a part's bytes, or append the part if it does not exist yet.
    pub fn set_part(&mut self, name: &str, blob: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = blob,
            None => self.parts.push((name.to_string(), blob)),
        }
    }

    /// Resolve a relationship id in a `.rels` part to the full name of its
    /// target part. `base_dir` is the directory the targets are relative to
    /// (`ppt` for `ppt/_rels/presentation.xml.rels`).
    pub fn relationship_target(
        &self,
        rels_part: &str,
        r_id: &str,
        base_dir: &str,
    ) -> Result<String> {
        let blob = self.part(rels_part)?;
        let mut reader = Reader::from_reader(blob);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| PptxError::Xml(err.to_string()))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| PptxError::Xml(err.to_string()))?;
                        match attr.key.as_ref() {
                            b"Id" => id = Some(value.into_owned()),
                            b"Target" => target = Some(value.into_owned()),
                            _ => {}
                        }
                    }
                    if id.as_deref() == Some(r_id) {
                        let target = target.ok_or_else(|| {
                            PptxError::Xml(format!("relationship {} has no Target", r_id))
                        })?;
                        return Ok(resolve_target(base_dir, &target));
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(e.into()),
                _ => {},
            }
            buf.clear();
        }

        Err(PptxError::InvalidPackage(format!(
            "relationship {} not found in {}",
            r_id, rels_part
        )))
    }

    /// Append a relationship to a `.rels` part, returning the new rId.
    pub fn add_relationship(&mut self, rels_part: &str, rel_type: &str, target: &str) -> Result<String> {
        let blob = self.part(rels_part)?;

        let mut max_id = 0u32;
        let mut reader = Reader::from_reader(blob);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| PptxError::Xml(err.to_string()))?;
                        if attr.key.as_ref() == b"Id" {
                            if let Ok(value) = attr.unescape_value() {
                                if let Some(num) = value.strip_prefix("rId") {
                                    if let Ok(num) = num.parse::<u32>() {
                                        max_id = max_id.max(num);
                                    }
                                }
                            }
                        }
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(e.into()),
                _ => {},
            }
            buf.clear();
        }

        let r_id = format!("rId{}", max_id + 1);
        let insert = format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            r_id, rel_type, target
        );
        let updated = splice_before(blob, b"</Relationships>", insert.as_bytes())
            .ok_or_else(|| {
                PptxError::InvalidPackage(format!("{} has no Relationships element", rels_part))
            })?;
        self.set_part(rels_part, updated);
        Ok(r_id)
    }

    /// Register a content type override for a new part.
    pub fn add_content_type_override(&mut self, part_name: &str, content_type: &str) -> Result<()> {
        let blob = self.part(CONTENT_TYPES_PART)?;
        let insert = format!(
            r#"<Override PartName="{}" ContentType="{}"/>"#,
            part_name, content_type
        );
        let updated = splice_before(blob, b"</Types>", insert.as_bytes()).ok_or_else(|| {
            PptxError::InvalidPackage("content types part has no Types element".to_string())
        })?;
        self.set_part(CONTENT_TYPES_PART, updated);
        Ok(())
    }

    /// Serialize the package to a `.pptx` file. Nothing is written until
    /// this point, so a failed run never leaves partial output behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = zip::ZipWriter::new(writer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, blob) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(blob)?;
        }
        zip.finish()?;
        Ok(())
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Insert `insert` immediately before the first occurrence of `marker`.
pub(crate) fn splice_before(blob: &[u8], marker: &[u8], insert: &[u8]) -> Option<Vec<u8>> {
    let pos = find_subslice(blob, marker)?;
    let mut out = Vec::with_capacity(blob.len() + insert.len());
    out.extend_from_slice(&blob[..pos]);
    out.extend_from_slice(insert);
    out.extend_from_slice(&blob[pos..]);
    Some(out)
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
