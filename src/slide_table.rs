/// Table generation: builds the DrawingML table shape for one slide.
///
/// The table is a `p:graphicFrame` holding an `a:tbl`, spliced into the
/// slide part's shape tree. Geometry is fixed in EMUs (914400 EMU = 1 inch,
/// 360000 EMU = 1 cm): position, row height, and the five column widths do
/// not depend on the data.
use std::fmt::Write as _;

use log::debug;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::error::{PptxError, Result};
use crate::package::splice_before;

/// The table always has exactly this many columns, whatever the CSV held.
pub const NUM_COLS: usize = 5;

/// Column widths in EMUs (3.15, 2.95, 4, 4.15, 3.5 cm).
pub const COL_WIDTHS: [i64; NUM_COLS] = [1_134_000, 1_062_000, 1_440_000, 1_494_000, 1_260_000];

/// Row height in EMUs (0.78 cm).
pub const ROW_HEIGHT: i64 = 280_800;

pub const TABLE_LEFT: i64 = 2_373_459;
pub const TABLE_TOP: i64 = 476_130;

pub const FONT_NAME: &str = "Calibri";
/// Font size in hundredths of a point (14 pt).
pub const FONT_SIZE: u32 = 1_400;

const TABLE_STYLE_ID: &str = "{5C22544A-7EE6-4342-B048-85BDC9FD1C3A}";

/// Adds a table shape to a slide part and returns the updated slide XML.
///
/// Row 0 holds `column_names` in bold; each data row follows in its own
/// value order. Cells are zipped positionally against the five columns, so
/// a short row leaves its trailing cells empty and extra values are
/// dropped. An empty `data_rows` produces a header-only table.
pub fn generate_table(
    slide_xml: &[u8],
    data_rows: &[Vec<String>],
    column_names: &[String],
) -> Result<Vec<u8>> {
    let num_rows = data_rows.len() + 1;
    let shape_id = next_shape_id(slide_xml)?;
    debug!("Adding {}x{} table to slide as shape id {}", num_rows, NUM_COLS, shape_id);

    let frame = table_frame_xml(shape_id, data_rows, column_names);
    splice_before(slide_xml, b"</p:spTree>", frame.as_bytes())
        .ok_or_else(|| PptxError::InvalidPackage("slide part has no shape tree".to_string()))
}

/// Builds the `p:graphicFrame` fragment for the table.
fn table_frame_xml(shape_id: u32, data_rows: &[Vec<String>], column_names: &[String]) -> String {
    let num_rows = (data_rows.len() + 1) as i64;
    let table_width: i64 = COL_WIDTHS.iter().sum();
    // Height reserves one extra row beyond the grid.
    let table_height = (num_rows + 1) * ROW_HEIGHT;

    let mut xml = String::with_capacity(1024 + 256 * NUM_COLS * num_rows as usize);

    xml.push_str("<p:graphicFrame>");
    xml.push_str("<p:nvGraphicFramePr>");
    let _ = write!(xml, r#"<p:cNvPr id="{}" name="Table {}"/>"#, shape_id, shape_id);
    xml.push_str(r#"<p:cNvGraphicFramePr><a:graphicFrameLocks noGrp="1"/></p:cNvGraphicFramePr>"#);
    xml.push_str("<p:nvPr/>");
    xml.push_str("</p:nvGraphicFramePr>");

    let _ = write!(
        xml,
        r#"<p:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></p:xfrm>"#,
        TABLE_LEFT, TABLE_TOP, table_width, table_height
    );

    xml.push_str("<a:graphic>");
    xml.push_str(
        r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table">"#,
    );
    xml.push_str("<a:tbl>");
    let _ = write!(
        xml,
        r#"<a:tblPr firstRow="1" bandRow="1"><a:tableStyleId>{}</a:tableStyleId></a:tblPr>"#,
        TABLE_STYLE_ID
    );

    xml.push_str("<a:tblGrid>");
    for width in COL_WIDTHS {
        let _ = write!(xml, r#"<a:gridCol w="{}"/>"#, width);
    }
    xml.push_str("</a:tblGrid>");

    let _ = write!(xml, r#"<a:tr h="{}">"#, ROW_HEIGHT);
    for col in 0..NUM_COLS {
        cell_xml(&mut xml, column_names.get(col).map(String::as_str), true);
    }
    xml.push_str("</a:tr>");

    for row in data_rows {
        let _ = write!(xml, r#"<a:tr h="{}">"#, ROW_HEIGHT);
        for col in 0..NUM_COLS {
            cell_xml(&mut xml, row.get(col).map(String::as_str), false);
        }
        xml.push_str("</a:tr>");
    }

    xml.push_str("</a:tbl>");
    xml.push_str("</a:graphicData>");
    xml.push_str("</a:graphic>");
    xml.push_str("</p:graphicFrame>");
    xml
}

/// Emits one table cell. `None` produces an empty paragraph.
fn cell_xml(xml: &mut String, text: Option<&str>, bold: bool) {
    xml.push_str("<a:tc><a:txBody><a:bodyPr/><a:lstStyle/>");
    match text {
        Some(text) => {
            xml.push_str("<a:p><a:r>");
            let _ = write!(
                xml,
                r#"<a:rPr lang="en-US" sz="{}"{}><a:latin typeface="{}"/></a:rPr>"#,
                FONT_SIZE,
                if bold { r#" b="1""# } else { "" },
                FONT_NAME
            );
            let _ = write!(xml, "<a:t>{}</a:t>", escape(text));
            xml.push_str("</a:r></a:p>");
        },
        None => xml.push_str("<a:p/>"),
    }
    xml.push_str("</a:txBody><a:tcPr/></a:tc>");
}

/// Scans the slide for existing `p:cNvPr` shape ids and returns a free one.
fn next_shape_id(slide_xml: &[u8]) -> Result<u32> {
    let mut reader = Reader::from_reader(slide_xml);
    reader.config_mut().trim_text(true);

    let mut max_id = 1u32;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"cNvPr" =>
            {
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| PptxError::Xml(err.to_string()))?;
                    if attr.key.as_ref() == b"id" {
                        if let Ok(value) = attr.unescape_value() {
                            if let Ok(id) = value.parse::<u32>() {
                                max_id = max_id.max(id);
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
    Ok(max_id + 1)
}
