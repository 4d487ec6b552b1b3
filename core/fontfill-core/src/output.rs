//! Handing the finished wardrobe back to whoever asked for it
//!
//! A run ends with a list of fonts and every coat each one now owns. Some
//! callers want to read that list over coffee (pretty JSON), others want to
//! pipe it somewhere one font at a time (NDJSON), and a terminal just wants
//! a tidy listing.
//!
//! Made with love at FontLab https://www.fontlab.com/

use std::io::Write;

use anyhow::Result;

use crate::variant::FontPreview;

/// The whole result list as one indented JSON array.
pub fn write_json_pretty(results: &[FontPreview], mut w: impl Write) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    w.write_all(json.as_bytes())?;
    w.write_all(b"\n")?;
    Ok(())
}

/// One font per line, ready for `jq` or a streaming consumer.
pub fn write_ndjson(results: &[FontPreview], mut w: impl Write) -> Result<()> {
    for item in results {
        let line = serde_json::to_string(item)?;
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// Human listing: the font name, then one indented line per format.
pub fn write_plain(results: &[FontPreview], mut w: impl Write) -> Result<()> {
    for item in results {
        writeln!(w, "{}", item.name)?;
        for (format, location) in &item.formats {
            let marker = if *location == item.preview { "*" } else { " " };
            writeln!(w, "  {marker} {:<6} {location}", format.ext())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FontFormat;
    use crate::location::Location;
    use std::collections::BTreeMap;

    fn sample() -> FontPreview {
        let mut formats = BTreeMap::new();
        formats.insert(FontFormat::Ttf, Location::new("/download?path=A.ttf"));
        formats.insert(FontFormat::Woff2, Location::new("/download?path=A.woff2"));
        FontPreview {
            name: "A".to_string(),
            preview: Location::new("/download?path=A.woff2"),
            formats,
        }
    }

    #[test]
    fn ndjson_writes_one_line_per_font() {
        let mut buf = Vec::new();
        write_ndjson(&[sample(), sample()], &mut buf).expect("write ndjson");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: FontPreview = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(parsed, sample());
    }

    #[test]
    fn plain_marks_the_preview() {
        let mut buf = Vec::new();
        write_plain(&[sample()], &mut buf).expect("write plain");

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("A\n"));
        assert!(text.contains("  * .woff2 /download?path=A.woff2"), "{text}");
        assert!(text.contains("    .ttf   /download?path=A.ttf"), "{text}");
    }
}
