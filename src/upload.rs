use axum::http::HeaderMap;
use bytes::Bytes;

/// A project upload: the requested name plus one script or archive.
#[derive(Debug, Clone)]
pub struct ProjectUpload {
    pub name: String,
    pub file_name: String,
    pub content: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Script,
    Archive,
}

impl UploadKind {
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".py") {
            Some(UploadKind::Script)
        } else if lower.ends_with(".zip") {
            Some(UploadKind::Archive)
        } else {
            None
        }
    }
}

/// Parse a `multipart/form-data` body with a `name` text field and a `file` field.
pub async fn parse_project_upload(headers: &HeaderMap, body: Bytes) -> Result<ProjectUpload, String> {
    let boundary = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| "Missing multipart boundary".to_string())?;

    let stream = futures_util::stream::once(async { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut name = None;
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {e}"))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| format!("Field read error: {e}"))?;
                name = Some(value);
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| "The file field has no file name".to_string())?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Field read error: {e}"))?;
                file = Some((file_name, content));
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| "Missing 'name' field".to_string())?;
    let (file_name, content) = file.ok_or_else(|| "Missing 'file' field".to_string())?;
    Ok(ProjectUpload {
        name,
        file_name,
        content,
    })
}
