use anyhow::{bail, Result};
use log::debug;

use crate::layers::RawPayload;

pub const UNPRINTABLE: &str = "<binary-unprintable>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub hex: String,
    pub ascii: String,
}

fn printable(b: u8) -> char {
    if (32..=126).contains(&b) {
        b as char
    } else {
        '.'
    }
}

/// Hex and ASCII renderings of at most `limit` leading payload bytes.
pub(crate) fn preview(payload: &RawPayload, limit: usize) -> Result<Preview> {
    let bytes = match payload {
        RawPayload::Bytes(bytes) => *bytes,
        RawPayload::Malformed(reason) => bail!("payload is not accessible: {}", reason),
    };
    let head = &bytes[..bytes.len().min(limit)];
    Ok(Preview {
        hex: hex::encode(head),
        ascii: head.iter().copied().map(printable).collect(),
    })
}

/// The summary-line segment for a payload, never failing.
pub(crate) fn render(payload: &RawPayload, limit: usize) -> String {
    match preview(payload, limit) {
        Ok(p) => format!(" payload_preview(hex/ASCII)={} / {}", p.hex, p.ascii),
        Err(e) => {
            debug!("Cannot render payload preview: {:#}", e);
            format!(" payload_preview={}", UNPRINTABLE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_ascii() {
        let p = preview(&RawPayload::Bytes(b"Hi\x00\x7f"), 64).unwrap();
        assert_eq!(p.hex, "4869007f");
        assert_eq!(p.ascii, "Hi..");
    }

    #[test]
    fn printable_range_is_inclusive() {
        let p = preview(&RawPayload::Bytes(&[31, 32, 126, 127]), 4).unwrap();
        assert_eq!(p.ascii, ". ~.");
    }

    #[test]
    fn limit_truncates() {
        let p = preview(&RawPayload::Bytes(b"abcdef"), 3).unwrap();
        assert_eq!(p, Preview { hex: "616263".into(), ascii: "abc".into() });
    }

    #[test]
    fn malformed_payload_uses_marker() {
        let rendered = render(&RawPayload::Malformed("short".into()), 64);
        assert_eq!(rendered, " payload_preview=<binary-unprintable>");
    }

    #[test]
    fn rendered_segment() {
        let rendered = render(&RawPayload::Bytes(b"GET /"), 64);
        assert_eq!(rendered, " payload_preview(hex/ASCII)=474554202f / GET /");
    }
}
