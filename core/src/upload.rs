//! Media library: multipart uploads, file listing and deletion.
//!
//! The multipart body is encoded here rather than by the transport so that
//! an `HttpRequest` stays plain data any host can send as-is.

use std::fmt::Write as _;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::normalize::{normalize, Normalized};
use crate::query::Query;
use crate::session::Session;
use crate::transport::Transport;
use crate::types::{Entity, EntityId, FilePart, UploadTarget};

/// Field name Strapi expects the file parts under.
const FILES_FIELD: &str = "files";

/// Encode `files` and the optional target fields as `multipart/form-data`.
/// Returns the boundary together with the body.
pub(crate) fn encode_multipart(files: &[FilePart], target: &UploadTarget) -> (String, Vec<u8>) {
    let boundary = format!("strapi-{}", Uuid::new_v4().simple());
    let mut body = Vec::new();

    for file in files {
        let mut head = String::new();
        let _ = write!(
            head,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{FILES_FIELD}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            escape_file_name(&file.file_name),
            strip_line_breaks(&file.content_type),
        );
        body.extend_from_slice(head.as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }

    let ref_id = target.ref_id.as_ref().map(EntityId::to_string);
    let fields = [
        ("ref", target.reference.as_deref()),
        ("refId", ref_id.as_deref()),
        ("field", target.field.as_deref()),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            let part = format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{}\r\n",
                strip_line_breaks(value),
            );
            body.extend_from_slice(part.as_bytes());
        }
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

/// Escape the characters that would end the quoted `filename` parameter or
/// the header line, the same way browsers encode form file names.
fn escape_file_name(name: &str) -> String {
    name.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

pub struct Uploads<T> {
    session: Session<T>,
}

impl<T: Transport> Uploads<T> {
    pub fn new(session: Session<T>) -> Self {
        Self { session }
    }

    /// Upload files, optionally attaching them to a record field. Returns the
    /// created file records.
    pub async fn upload(&self, files: &[FilePart], target: &UploadTarget) -> Result<Vec<Entity>> {
        let request = self.session.client().build_upload(files, target);
        let response = self.session.send(request).await?;
        let body = self.session.client().parse_body(response)?;
        let uploaded = normalize(Some(&body))?.into_many();
        debug!(count = uploaded.len(), "uploaded files");
        Ok(uploaded)
    }

    pub async fn list_files(&self, query: &Query) -> Result<Vec<Entity>> {
        let request = self.session.client().build_list_files(query);
        let response = self.session.send(request).await?;
        let body = self.session.client().parse_body(response)?;
        Ok(normalize(Some(&body))?.into_many())
    }

    /// Delete a file. Returns the deleted record when the backend echoes it.
    pub async fn delete_file(&self, id: impl Into<EntityId>) -> Result<Option<Entity>> {
        let request = self.session.client().build_delete_file(&id.into());
        let response = self.session.send(request).await?;
        let body = self.session.client().parse_body(response)?;
        match normalize(Some(&body))? {
            Normalized::Empty => Ok(None),
            other => other.into_one().map(Some),
        }
    }
}
