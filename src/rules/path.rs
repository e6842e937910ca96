use std::borrow::Cow;

/// Request path with its dot segments resolved.
///
/// `raw` keeps the original percent-encoding and is what gets forwarded, while
/// `decoded` is what rules are matched against. Segments are decoded one by
/// one so an encoded `/` never introduces a new segment, but `%2e%2e` is a
/// parent reference like `..`. Backslashes separate segments, as they do for
/// `http` URLs.
#[derive(Debug, PartialEq)]
pub struct CanonicalPath {
    pub raw: String,
    pub decoded: String,
}

impl CanonicalPath {
    pub fn new(path: &str) -> Self {
        let Some(relative) = path.strip_prefix('/') else {
            return Self {
                raw: path.to_string(),
                decoded: decode(path).into_owned(),
            };
        };

        let segments: Vec<&str> = relative.split(['/', '\\']).collect();
        let last = segments.len() - 1;

        let mut raw: Vec<&str> = Vec::with_capacity(segments.len());
        let mut decoded: Vec<Cow<str>> = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            let segment_decoded = decode(segment);
            let is_parent = segment_decoded == "..";
            if is_parent || segment_decoded == "." {
                if is_parent {
                    raw.pop();
                    decoded.pop();
                }
                if index == last {
                    raw.push("");
                    decoded.push(Cow::Borrowed(""));
                }
            } else {
                raw.push(segment);
                decoded.push(segment_decoded);
            }
        }

        Self {
            raw: format!("/{}", raw.join("/")),
            decoded: format!("/{}", decoded.join("/")),
        }
    }
}

fn decode(segment: &str) -> Cow<str> {
    match urlencoding::decode_binary(segment.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(segment),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
