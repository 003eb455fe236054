use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Serialize};

use super::super::domain::ApplicationId;

pub const DEFAULT_MAX_DOCUMENTS_PER_APPLICATION: usize = 30;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 30 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 11] = [
    "pdf", "jpg", "jpeg", "png", "gif", "bmp", "doc", "docx", "xls", "xlsx", "txt",
];
pub const DEFAULT_ALLOWED_CONTENT_TYPES: [&str; 11] = [
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/jpg",
    "image/gif",
    "image/bmp",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
];

/// Lifecycle of one uploaded file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentVersionStatus {
    Pending,
    Uploaded,
    Available,
    Rejected,
}

impl DocumentVersionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Available => "available",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this version satisfies a document requirement.
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Uploaded | Self::Available)
    }
}

/// Status of the newest version of a requirement-linked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersion {
    pub requirement_code: String,
    pub status: DocumentVersionStatus,
}

/// Upload slot request as received from the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub requirement_code: Option<String>,
    /// Existing document to add a version to; a new document otherwise.
    #[serde(default)]
    pub document_id: Option<u64>,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Document collaborator consumed by the requirement checker and the
/// upload endpoints.
pub trait DocumentStore: Send + Sync {
    fn list_latest_versions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<LatestVersion>, DocumentStoreError>;

    /// Reserve a pending version after the upload policy accepts the file.
    fn start_upload(
        &self,
        application: &ApplicationId,
        request: &UploadRequest,
    ) -> Result<UploadTicket, DocumentStoreError>;

    /// Finish a pending version owned by `application`.
    fn finish_upload(
        &self,
        application: &ApplicationId,
        version_id: &str,
        mark_available: bool,
    ) -> Result<DocumentVersionStatus, DocumentStoreError>;

    /// Drop every document of a deleted application.
    fn discard(&self, application: &ApplicationId) -> Result<(), DocumentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("content type '{0}' is not allowed")]
    ContentType(String),
    #[error("file extension of '{0}' is not allowed")]
    Extension(String),
    #[error("file of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("application already has the maximum of {max} documents")]
    LimitReached { max: usize },
    #[error("unknown document {0}")]
    UnknownDocument(u64),
    #[error("unknown document version {0}")]
    UnknownVersion(String),
}

/// Limits applied before an upload slot is handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_documents_per_application: usize,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_documents_per_application: DEFAULT_MAX_DOCUMENTS_PER_APPLICATION,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|kind| kind.to_string())
                .collect(),
        }
    }
}

impl UploadPolicy {
    pub fn check(&self, filename: &str, content_type: &str, size: u64) -> Result<(), DocumentStoreError> {
        let essence = content_type
            .parse::<Mime>()
            .map(|parsed| parsed.essence_str().to_ascii_lowercase())
            .map_err(|_| DocumentStoreError::ContentType(content_type.to_string()))?;
        if !self.allowed_content_types.is_empty()
            && !self.allowed_content_types.iter().any(|allowed| *allowed == essence)
        {
            return Err(DocumentStoreError::ContentType(content_type.to_string()));
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if extension.is_empty()
            || (!self.allowed_extensions.is_empty()
                && !self.allowed_extensions.iter().any(|allowed| *allowed == extension))
        {
            return Err(DocumentStoreError::Extension(filename.to_string()));
        }

        if size > self.max_file_size {
            return Err(DocumentStoreError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}

/// Upload slot returned by [`InMemoryDocumentRegistry::request_upload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTicket {
    pub document_id: u64,
    pub version_id: String,
    pub version: u32,
    pub storage_key: String,
}

/// One upload attempt of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentVersion {
    pub id: String,
    pub version: u32,
    pub status: DocumentVersionStatus,
    pub storage_key: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: u64,
    requirement_code: Option<String>,
    archived: bool,
    versions: Vec<DocumentVersion>,
}

impl StoredDocument {
    fn latest(&self) -> Option<&DocumentVersion> {
        self.versions.iter().max_by_key(|version| version.version)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_document_id: u64,
    documents: HashMap<ApplicationId, Vec<StoredDocument>>,
}

/// In-process document registry; byte transport happens elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRegistry {
    policy: UploadPolicy,
    state: Mutex<RegistryState>,
}

impl InMemoryDocumentRegistry {
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Reserve a new version. Without `document` a new document is created,
    /// which counts against the per-application limit.
    pub fn request_upload(
        &self,
        application: &ApplicationId,
        requirement_code: Option<&str>,
        document: Option<u64>,
        filename: &str,
        content_type: &str,
        size: u64,
    ) -> Result<UploadTicket, DocumentStoreError> {
        self.policy.check(filename, content_type, size)?;

        let mut state = self.lock()?;
        let document_id = match document {
            Some(id) => id,
            None => {
                let active = state
                    .documents
                    .get(application)
                    .map_or(0, |documents| documents.iter().filter(|doc| !doc.archived).count());
                if active >= self.policy.max_documents_per_application {
                    return Err(DocumentStoreError::LimitReached {
                        max: self.policy.max_documents_per_application,
                    });
                }
                state.next_document_id += 1;
                let id = state.next_document_id;
                state
                    .documents
                    .entry(application.clone())
                    .or_default()
                    .push(StoredDocument {
                        id,
                        requirement_code: requirement_code.map(str::to_string),
                        archived: false,
                        versions: Vec::new(),
                    });
                id
            }
        };

        let stored = state
            .documents
            .get_mut(application)
            .and_then(|documents| documents.iter_mut().find(|doc| doc.id == document_id))
            .ok_or(DocumentStoreError::UnknownDocument(document_id))?;
        let version = stored.latest().map_or(1, |latest| latest.version + 1);
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let folder = stored.requirement_code.as_deref().unwrap_or("misc");
        let storage_key =
            format!("applications/{application}/{folder}/doc-{document_id:06}-v{version}.{extension}");
        let version_id = format!("doc-{document_id:06}-v{version}");
        stored.versions.push(DocumentVersion {
            id: version_id.clone(),
            version,
            status: DocumentVersionStatus::Pending,
            storage_key: storage_key.clone(),
            original_name: filename.to_string(),
            mime_type: content_type.to_string(),
            size,
            uploaded_at: None,
        });

        Ok(UploadTicket {
            document_id,
            version_id,
            version,
            storage_key,
        })
    }

    /// Mark a version as uploaded, optionally promoting it straight to available.
    pub fn complete_upload(
        &self,
        version_id: &str,
        mark_available: bool,
    ) -> Result<DocumentVersionStatus, DocumentStoreError> {
        let status = if mark_available {
            DocumentVersionStatus::Available
        } else {
            DocumentVersionStatus::Uploaded
        };
        self.with_version(version_id, |version| {
            version.status = status;
            version.uploaded_at = Some(Utc::now());
        })?;
        Ok(status)
    }

    pub fn mark_rejected(&self, version_id: &str) -> Result<(), DocumentStoreError> {
        self.with_version(version_id, |version| {
            version.status = DocumentVersionStatus::Rejected;
        })
    }

    /// Archived documents stop counting toward limits and requirements.
    pub fn archive(&self, application: &ApplicationId, document_id: u64) -> Result<(), DocumentStoreError> {
        let mut state = self.lock()?;
        let document = state
            .documents
            .get_mut(application)
            .and_then(|documents| documents.iter_mut().find(|doc| doc.id == document_id))
            .ok_or(DocumentStoreError::UnknownDocument(document_id))?;
        document.archived = true;
        Ok(())
    }

    pub fn version(&self, version_id: &str) -> Option<DocumentVersion> {
        let state = self.lock().ok()?;
        state
            .documents
            .values()
            .flatten()
            .flat_map(|document| document.versions.iter())
            .find(|version| version.id == version_id)
            .cloned()
    }

    fn with_version(
        &self,
        version_id: &str,
        apply: impl FnOnce(&mut DocumentVersion),
    ) -> Result<(), DocumentStoreError> {
        let mut state = self.lock()?;
        let version = state
            .documents
            .values_mut()
            .flatten()
            .flat_map(|document| document.versions.iter_mut())
            .find(|version| version.id == version_id)
            .ok_or_else(|| DocumentStoreError::UnknownVersion(version_id.to_string()))?;
        apply(version);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>, DocumentStoreError> {
        self.state
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("registry lock poisoned".to_string()))
    }
}

impl DocumentStore for InMemoryDocumentRegistry {
    fn list_latest_versions(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<LatestVersion>, DocumentStoreError> {
        let state = self.lock()?;
        let Some(documents) = state.documents.get(application) else {
            return Ok(Vec::new());
        };
        Ok(documents
            .iter()
            .filter(|document| !document.archived)
            .filter_map(|document| {
                let code = document.requirement_code.clone()?;
                let latest = document.latest()?;
                Some(LatestVersion {
                    requirement_code: code,
                    status: latest.status,
                })
            })
            .collect())
    }

    fn start_upload(
        &self,
        application: &ApplicationId,
        request: &UploadRequest,
    ) -> Result<UploadTicket, DocumentStoreError> {
        self.request_upload(
            application,
            request.requirement_code.as_deref(),
            request.document_id,
            &request.filename,
            &request.content_type,
            request.size,
        )
    }

    fn finish_upload(
        &self,
        application: &ApplicationId,
        version_id: &str,
        mark_available: bool,
    ) -> Result<DocumentVersionStatus, DocumentStoreError> {
        let owned = self.lock()?.documents.get(application).map_or(false, |documents| {
            documents
                .iter()
                .flat_map(|document| document.versions.iter())
                .any(|version| version.id == version_id)
        });
        if !owned {
            return Err(DocumentStoreError::UnknownVersion(version_id.to_string()));
        }
        self.complete_upload(version_id, mark_available)
    }

    fn discard(&self, application: &ApplicationId) -> Result<(), DocumentStoreError> {
        self.lock()?.documents.remove(application);
        Ok(())
    }
}
