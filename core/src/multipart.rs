//! `multipart/form-data` encoding for uploads.
//!
//! # Design
//! A form is a list of text fields followed by a list of file parts. The
//! encoder writes text fields first, each part delimited by the boundary,
//! and closes with the terminating boundary. Field and file names are
//! quoted; `"` and CR/LF inside them are percent-escaped.

use uuid::Uuid;

/// Field name under which `MultipartForm::upload` places the file.
pub const FILE_FIELD: &str = "file";

const CRLF: &[u8] = b"\r\n";

/// A single file attached to a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, FilePart)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A form with the given text fields and one file under `file`.
    pub fn upload<I, K, V>(
        params: I,
        file_name: impl Into<String>,
        data: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let form = params
            .into_iter()
            .fold(Self::new(), |form, (name, value)| form.text(name, value));
        form.file(FILE_FIELD, FilePart::new(file_name, data, mime_type))
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, name: impl Into<String>, part: FilePart) -> Self {
        self.files.push((name.into(), part));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[(String, FilePart)] {
        &self.files
    }

    /// Encode the form body using `boundary`.
    pub fn encode(&self, boundary: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.fields {
            write_delimiter(&mut out, boundary);
            out.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"", escape(name)).as_bytes(),
            );
            out.extend_from_slice(CRLF);
            out.extend_from_slice(CRLF);
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(CRLF);
        }
        for (name, part) in &self.files {
            write_delimiter(&mut out, boundary);
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                    escape(name),
                    escape(&part.file_name)
                )
                .as_bytes(),
            );
            out.extend_from_slice(CRLF);
            out.extend_from_slice(format!("Content-Type: {}", part.mime_type).as_bytes());
            out.extend_from_slice(CRLF);
            out.extend_from_slice(CRLF);
            out.extend_from_slice(&part.data);
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(format!("--{boundary}--").as_bytes());
        out.extend_from_slice(CRLF);
        out
    }
}

/// `Content-Type` header value for a body encoded with `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data;boundary={boundary}")
}

pub fn new_boundary() -> String {
    format!("gateway-{}", Uuid::new_v4().simple())
}

fn write_delimiter(out: &mut Vec<u8>, boundary: &str) {
    out.extend_from_slice(format!("--{boundary}").as_bytes());
    out.extend_from_slice(CRLF);
}

fn escape(name: &str) -> String {
    name.replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
