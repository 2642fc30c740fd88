//! ASCII armor for keys and detached signatures
//!
//! ```text
//! -----BEGIN ATTEST SIGNATURE-----
//! Key-Fingerprint: 3f2a...
//!
//! <base64, 64 columns>
//! -----END ATTEST SIGNATURE-----
//! ```
//!
//! Lines starting with `=` (checksum lines some tools append) are ignored.

use base64::Engine;

const LINE_WIDTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    PublicKey,
    SecretKey,
    Signature,
}

impl ArmorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ArmorKind::PublicKey => "ATTEST PUBLIC KEY",
            ArmorKind::SecretKey => "ATTEST SECRET KEY",
            ArmorKind::Signature => "ATTEST SIGNATURE",
        }
    }

    fn begin_line(&self) -> String {
        format!("-----BEGIN {}-----", self.label())
    }

    fn end_line(&self) -> String {
        format!("-----END {}-----", self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArmorError {
    #[error("no '{0}' block found")]
    MissingBegin(&'static str),

    #[error("'{0}' block is not terminated")]
    MissingEnd(&'static str),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decoded armor block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredBlock {
    pub kind: ArmorKind,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

impl ArmoredBlock {
    pub fn new(kind: ArmorKind, data: Vec<u8>) -> Self {
        Self {
            kind,
            headers: Vec::new(),
            data,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = self.kind.begin_line();
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\n", name, value));
        }
        out.push('\n');

        let body = base64::engine::general_purpose::STANDARD.encode(&self.data);
        for chunk in body.as_bytes().chunks(LINE_WIDTH) {
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push('\n');
        }
        out.push_str(&self.kind.end_line());
        out.push('\n');
        out
    }

    /// Decode the first block of `kind` in `text`
    pub fn decode(kind: ArmorKind, text: &str) -> Result<Self, ArmorError> {
        let begin = kind.begin_line();
        let end = kind.end_line();

        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r').trim())
            .skip_while(|l| *l != begin);
        if lines.next().is_none() {
            return Err(ArmorError::MissingBegin(kind.label()));
        }

        let mut headers = Vec::new();
        let mut body = String::new();
        let mut terminated = false;
        for line in lines {
            if line == end {
                terminated = true;
                break;
            }
            if line.is_empty() || line.starts_with('=') {
                continue;
            }
            match line.split_once(": ") {
                Some((name, value)) if body.is_empty() => {
                    headers.push((name.to_string(), value.to_string()));
                }
                _ => body.push_str(line),
            }
        }
        if !terminated {
            return Err(ArmorError::MissingEnd(kind.label()));
        }

        let data = base64::engine::general_purpose::STANDARD.decode(body.as_bytes())?;
        Ok(Self {
            kind,
            headers,
            data,
        })
    }
}
