//! `Accept-Encoding` negotiation (RFC 9110 §12.5.3).

use super::Request;

/// A content coding a response body can be sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Identity,
}

impl ContentCoding {
    /// Returns the token used in `Content-Encoding`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Identity => "identity",
        }
    }
}

// Quality value of one `coding;q=x` element; malformed weights count as 1.
fn quality(element: &str) -> (&str, f32) {
    let mut parts = element.split(';');
    let coding = parts.next().unwrap_or("").trim();
    let q = parts
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("q")
                .then(|| value.trim().parse::<f32>().ok())
                .flatten()
        })
        .next()
        .unwrap_or(1.0);
    (coding, q)
}

/// Chooses between `gzip` and `identity` for the given `Accept-Encoding` value.
///
/// - A missing or empty header only admits `identity`.
/// - `gzip` is chosen when its weight (explicit or via `*`) is non-zero and
///   at least the weight of `identity`.
/// - `identity` is implicitly acceptable at the lowest listed weight unless
///   it is named explicitly.
pub fn negotiate(accept_encoding: Option<&str>) -> ContentCoding {
    let Some(header) = accept_encoding.map(str::trim).filter(|h| !h.is_empty()) else {
        return ContentCoding::Identity;
    };

    let elements: Vec<(&str, f32)> = header
        .split(',')
        .map(quality)
        .filter(|(coding, _)| !coding.is_empty())
        .collect();

    let weight_of = |name: &str| {
        elements
            .iter()
            .find(|(coding, _)| coding.eq_ignore_ascii_case(name))
            .or_else(|| elements.iter().find(|(coding, _)| *coding == "*"))
            .map(|(_, q)| *q)
    };

    let gzip = weight_of("gzip").unwrap_or(0.0);
    let identity = weight_of("identity").unwrap_or_else(|| {
        elements
            .iter()
            .map(|(_, q)| *q)
            .fold(1.0_f32, f32::min)
    });

    if gzip > 0.0 && gzip >= identity {
        ContentCoding::Gzip
    } else {
        ContentCoding::Identity
    }
}

impl Request {
    /// Returns `true` if the client prefers a gzip-coded body over identity.
    pub fn accepts_gzip(&self) -> bool {
        negotiate(self.headers().get("accept-encoding")) == ContentCoding::Gzip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_means_identity() {
        assert_eq!(negotiate(None), ContentCoding::Identity);
        assert_eq!(negotiate(Some("")), ContentCoding::Identity);
    }

    #[test]
    fn plain_gzip_list() {
        assert_eq!(negotiate(Some("gzip, deflate, br")), ContentCoding::Gzip);
        assert_eq!(negotiate(Some("deflate, br")), ContentCoding::Identity);
    }

    #[test]
    fn zero_weight_rejects_gzip() {
        assert_eq!(negotiate(Some("gzip;q=0")), ContentCoding::Identity);
        assert_eq!(negotiate(Some("*;q=0.5, gzip;q=0")), ContentCoding::Identity);
    }

    #[test]
    fn wildcard_admits_gzip() {
        assert_eq!(negotiate(Some("*")), ContentCoding::Gzip);
    }

    #[test]
    fn identity_preference_wins() {
        assert_eq!(
            negotiate(Some("gzip;q=0.5, identity;q=1")),
            ContentCoding::Identity
        );
        assert_eq!(negotiate(Some("gzip;q=0.5")), ContentCoding::Gzip);
    }

    #[test]
    fn request_helper() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nAccept-Encoding: gzip\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.accepts_gzip());
    }
}
