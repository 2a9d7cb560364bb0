/// Presentation assembly: slide size normalization and slide selection.
///
/// The template's first slide hosts the table. If the template has no
/// slides at all, a new one is appended on the blank layout (layout index
/// 6), which means wiring up four parts: the slide XML itself, its `.rels`,
/// a content-type override, and a `p:sldId` entry in the presentation part.
use std::io::Cursor;

use log::{debug, info};
use quick_xml::{Reader, Writer};
use quick_xml::events::{BytesStart, Event};

use crate::error::{PptxError, Result};
use crate::package::{PptxPackage, find_subslice, splice_before};
use crate::slide_table;

/// Slide size in EMUs, forced onto every output regardless of template.
pub const SLIDE_WIDTH: i64 = 9_144_000;
pub const SLIDE_HEIGHT: i64 = 5_143_500;

/// 0-based index of the blank layout in the template's layout list.
pub const BLANK_SLIDE_LAYOUT: usize = 6;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";

const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const LAYOUT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";

const EMPTY_SLIDE_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    r#"<p:cSld><p:spTree>"#,
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/>"#,
    r#"<a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    r#"</p:spTree></p:cSld>"#,
    r#"<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
);

/// Normalizes the slide size, selects or creates the target slide, and
/// attaches the generated table to it.
pub fn generate_presentation(
    pkg: &mut PptxPackage,
    data_rows: &[Vec<String>],
    column_names: &[String],
) -> Result<()> {
    set_slide_size(pkg, SLIDE_WIDTH, SLIDE_HEIGHT)?;

    let slide_part = match first_slide_part(pkg)? {
        Some(part) => {
            debug!("Reusing existing slide {}", part);
            part
        },
        None => add_blank_slide(pkg)?,
    };

    let updated = slide_table::generate_table(pkg.part(&slide_part)?, data_rows, column_names)?;
    pkg.set_part(&slide_part, updated);
    Ok(())
}

fn xml_err<E: std::fmt::Display>(err: E) -> PptxError {
    PptxError::Xml(err.to_string())
}

/// Rewrites `p:sldSz` in the presentation part to the given dimensions.
/// Templates always carry one; if it is somehow absent the element is
/// inserted before the closing tag instead.
fn set_slide_size(pkg: &mut PptxPackage, width: i64, height: i64) -> Result<()> {
    let src = pkg.part(PRESENTATION_PART)?.to_vec();
    let mut reader = Reader::from_reader(src.as_slice());
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut found = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldSz" => {
                writer
                    .write_event(Event::Empty(resized(&e, width, height)?))
                    .map_err(xml_err)?;
                found = true;
            },
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"sldSz" => {
                writer
                    .write_event(Event::Start(resized(&e, width, height)?))
                    .map_err(xml_err)?;
                found = true;
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"presentation" && !found => {
                let mut elem = BytesStart::new("p:sldSz");
                elem.push_attribute(("cx", width.to_string().as_str()));
                elem.push_attribute(("cy", height.to_string().as_str()));
                writer.write_event(Event::Empty(elem)).map_err(xml_err)?;
                found = true;
                writer.write_event(Event::End(e)).map_err(xml_err)?;
            },
            Ok(event) => writer.write_event(event).map_err(xml_err)?,
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    pkg.set_part(PRESENTATION_PART, writer.into_inner().into_inner());
    Ok(())
}

/// Copy of `e` with its cx/cy attributes replaced.
fn resized(e: &BytesStart, width: i64, height: i64) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut elem = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() != b"cx" && attr.key.as_ref() != b"cy" {
            elem.push_attribute(attr);
        }
    }
    elem.push_attribute(("cx", width.to_string().as_str()));
    elem.push_attribute(("cy", height.to_string().as_str()));
    Ok(elem)
}

/// The part name of the first slide in `p:sldIdLst`, if any slide exists.
fn first_slide_part(pkg: &PptxPackage) -> Result<Option<String>> {
    let blob = pkg.part(PRESENTATION_PART)?;
    let mut reader = Reader::from_reader(blob);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"sldId" =>
            {
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_err)?;
                    if attr.key.as_ref() == b"r:id" {
                        let r_id = attr.unescape_value().map_err(xml_err)?.into_owned();
                        let part =
                            pkg.relationship_target(PRESENTATION_RELS_PART, &r_id, "ppt")?;
                        return Ok(Some(part));
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {},
        }
        buf.clear();
    }
    Ok(None)
}

/// Appends a new slide on the blank layout and returns its part name.
fn add_blank_slide(pkg: &mut PptxPackage) -> Result<String> {
    let layout_part = format!("ppt/slideLayouts/slideLayout{}.xml", BLANK_SLIDE_LAYOUT + 1);
    if !pkg.has_part(&layout_part) {
        return Err(PptxError::PartNotFound(layout_part));
    }

    let mut index = 1;
    while pkg.has_part(&format!("ppt/slides/slide{}.xml", index)) {
        index += 1;
    }
    let slide_part = format!("ppt/slides/slide{}.xml", index);
    info!("Template has no slides; adding {} on the blank layout", slide_part);

    pkg.set_part(&slide_part, EMPTY_SLIDE_XML.as_bytes().to_vec());

    let slide_rels = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="{}" Target="../slideLayouts/slideLayout{}.xml"/>"#,
            r#"</Relationships>"#
        ),
        LAYOUT_REL_TYPE,
        BLANK_SLIDE_LAYOUT + 1
    );
    pkg.set_part(
        &format!("ppt/slides/_rels/slide{}.xml.rels", index),
        slide_rels.into_bytes(),
    );

    pkg.add_content_type_override(&format!("/{}", slide_part), SLIDE_CONTENT_TYPE)?;
    let r_id = pkg.add_relationship(
        PRESENTATION_RELS_PART,
        SLIDE_REL_TYPE,
        &format!("slides/slide{}.xml", index),
    )?;
    register_slide_id(pkg, &r_id)?;

    Ok(slide_part)
}

/// Adds a `p:sldId` entry for a freshly created slide, creating the
/// `p:sldIdLst` when the template has none.
fn register_slide_id(pkg: &mut PptxPackage, r_id: &str) -> Result<()> {
    let blob = pkg.part(PRESENTATION_PART)?;
    let entry = format!(r#"<p:sldId id="256" r:id="{}"/>"#, r_id);

    let updated = if let Some(updated) = splice_before(blob, b"</p:sldIdLst>", entry.as_bytes()) {
        updated
    } else {
        let list = format!("<p:sldIdLst>{}</p:sldIdLst>", entry);
        if let Some(pos) = find_subslice(blob, b"<p:sldIdLst/>") {
            let mut out = Vec::with_capacity(blob.len() + entry.len());
            out.extend_from_slice(&blob[..pos]);
            out.extend_from_slice(list.as_bytes());
            out.extend_from_slice(&blob[pos + b"<p:sldIdLst/>".len()..]);
            out
        } else {
            // sldIdLst precedes sldSz, which set_slide_size has ensured.
            splice_before(blob, b"<p:sldSz", list.as_bytes()).ok_or_else(|| {
                PptxError::InvalidPackage(
                    "presentation part has no slide size element".to_string(),
                )
            })?
        }
    };

    pkg.set_part(PRESENTATION_PART, updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const CONTENT_TYPES: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"</Types>"#
    );

    fn template(with_slide: bool, with_layout: bool) -> PptxPackage {
        let presentation = if with_slide {
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#,
                r#"<p:sldIdLst><p:sldId id="256" r:id="rId2"/></p:sldIdLst>"#,
                r#"<p:sldSz cx="12192000" cy="6858000" type="custom"/>"#,
                r#"<p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
            )
        } else {
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#,
                r#"<p:sldSz cx="12192000" cy="6858000" type="custom"/>"#,
                r#"<p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
            )
        };

        let rels = if with_slide {
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#,
                r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>"#,
                r#"</Relationships>"#
            )
        } else {
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#,
                r#"</Relationships>"#
            )
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default();

            writer.start_file("[Content_Types].xml", options).unwrap();
            writer.write_all(CONTENT_TYPES.as_bytes()).unwrap();

            writer.start_file("ppt/presentation.xml", options).unwrap();
            writer.write_all(presentation.as_bytes()).unwrap();

            writer.start_file("ppt/_rels/presentation.xml.rels", options).unwrap();
            writer.write_all(rels.as_bytes()).unwrap();

            if with_slide {
                writer.start_file("ppt/slides/slide1.xml", options).unwrap();
                writer.write_all(EMPTY_SLIDE_XML.as_bytes()).unwrap();
            }
            if with_layout {
                writer.start_file("ppt/slideLayouts/slideLayout7.xml", options).unwrap();
                writer.write_all(b"<p:sldLayout/>").unwrap();
            }

            writer.finish().unwrap();
        }
        cursor.set_position(0);
        PptxPackage::from_reader(cursor).unwrap()
    }

    fn sample_rows() -> (Vec<Vec<String>>, Vec<String>) {
        (
            vec![
                vec!["Alice".to_string(), "30".to_string()],
                vec!["Bob".to_string(), "25".to_string()],
            ],
            vec!["Name".to_string(), "Age".to_string()],
        )
    }

    #[test]
    fn test_slide_size_is_normalized() {
        let mut pkg = template(true, false);
        let (rows, names) = sample_rows();
        generate_presentation(&mut pkg, &rows, &names).unwrap();

        let text = String::from_utf8_lossy(pkg.part("ppt/presentation.xml").unwrap()).into_owned();
        assert!(text.contains(r#"cx="9144000""#));
        assert!(text.contains(r#"cy="5143500""#));
        assert!(!text.contains(r#"cx="12192000""#));
        // Other sldSz attributes survive the rewrite.
        assert!(text.contains(r#"type="custom""#));
    }

    #[test]
    fn test_existing_slide_is_reused() {
        let mut pkg = template(true, false);
        let (rows, names) = sample_rows();
        generate_presentation(&mut pkg, &rows, &names).unwrap();

        let slide = String::from_utf8_lossy(pkg.part("ppt/slides/slide1.xml").unwrap()).into_owned();
        assert!(slide.contains("<p:graphicFrame>"));
        assert!(slide.contains("<a:t>Alice</a:t>"));
        assert!(!pkg.has_part("ppt/slides/slide2.xml"));
    }

    #[test]
    fn test_slide_is_created_when_template_has_none() {
        let mut pkg = template(false, true);
        let (rows, names) = sample_rows();
        generate_presentation(&mut pkg, &rows, &names).unwrap();

        let slide = String::from_utf8_lossy(pkg.part("ppt/slides/slide1.xml").unwrap()).into_owned();
        assert!(slide.contains("<p:graphicFrame>"));

        let pres = String::from_utf8_lossy(pkg.part("ppt/presentation.xml").unwrap()).into_owned();
        assert!(pres.contains(r#"<p:sldIdLst><p:sldId id="256" r:id="rId2"/></p:sldIdLst>"#));

        let rels =
            String::from_utf8_lossy(pkg.part("ppt/_rels/presentation.xml.rels").unwrap()).into_owned();
        assert!(rels.contains(r#"Target="slides/slide1.xml""#));

        let slide_rels =
            String::from_utf8_lossy(pkg.part("ppt/slides/_rels/slide1.xml.rels").unwrap()).into_owned();
        assert!(slide_rels.contains("slideLayout7.xml"));

        let types = String::from_utf8_lossy(pkg.part("[Content_Types].xml").unwrap()).into_owned();
        assert!(types.contains(r#"PartName="/ppt/slides/slide1.xml""#));
    }

    #[test]
    fn test_missing_blank_layout_is_fatal() {
        let mut pkg = template(false, false);
        let (rows, names) = sample_rows();
        let err = generate_presentation(&mut pkg, &rows, &names).unwrap_err();
        assert!(matches!(err, PptxError::PartNotFound(part) if part.contains("slideLayout7")));
    }

    #[test]
    fn test_header_only_table_on_empty_data() {
        let mut pkg = template(true, false);
        let names = vec!["Name".to_string(), "Age".to_string()];
        generate_presentation(&mut pkg, &[], &names).unwrap();

        let slide = String::from_utf8_lossy(pkg.part("ppt/slides/slide1.xml").unwrap()).into_owned();
        assert_eq!(slide.matches("<a:tr ").count(), 1);
    }
}
