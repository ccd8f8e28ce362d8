use std::path::PathBuf;

use chrono::Utc;
use rocket::data::{Data, ToByteUnit};
use rocket::fs::NamedFile;
use rocket::http::{Header, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{AdminUser, Permission};
use crate::error::AppError;
use crate::forms::Notification;
use crate::storage::{file_name, sanitize_upload_path, ObjectStore, UploadTracker};

const MAX_UPLOAD_MIB: u64 = 50;

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub notification: Notification,
    pub path: String,
    pub view_url: String,
    pub download_url: String,
}

fn upload_failed(error: AppError) -> Custom<Json<Notification>> {
    error.log_and_record("Material upload");
    Custom(
        error.status_code(),
        Json(Notification::error("File upload failed!")),
    )
}

/// Stores a workshop material. The returned path is linked to a workshop
/// only when the workshop form is saved.
#[put("/storage/materials?<filename>&<upsert>", data = "<data>")]
pub async fn upload_material(
    filename: &str,
    upsert: Option<bool>,
    data: Data<'_>,
    admin: AdminUser,
    store: &State<ObjectStore>,
    uploads: &State<UploadTracker>,
) -> Result<Json<UploadResponse>, Custom<Json<Notification>>> {
    if !admin.0.has_permission(Permission::UploadMaterials) {
        return Err(Custom(
            Status::Forbidden,
            Json(Notification::error("File upload failed!")),
        ));
    }

    let _ticket = uploads.begin(admin.0.id);

    let bytes = data
        .open(MAX_UPLOAD_MIB.mebibytes())
        .into_bytes()
        .await
        .map_err(|e| upload_failed(AppError::from(e)))?;

    if !bytes.is_complete() {
        warn!(filename = %filename, "Upload exceeds the size limit");
        return Err(upload_failed(AppError::Validation(format!(
            "File is larger than {} MiB",
            MAX_UPLOAD_MIB
        ))));
    }

    let key = sanitize_upload_path(filename, Utc::now().timestamp_millis());
    let path = store
        .upload(&key, &bytes, upsert.unwrap_or(false))
        .await
        .map_err(|e| upload_failed(AppError::from(e)))?;

    info!(path = %path, uploaded_by = %admin.0.email, "Material uploaded");

    Ok(Json(UploadResponse {
        notification: Notification::success(
            "File uploaded successfully. Save the workshop to confirm.",
        ),
        view_url: store.public_url(&path, false),
        download_url: store.public_url(&path, true),
        path,
    }))
}

#[derive(Responder)]
pub struct StoredFile {
    inner: NamedFile,
    disposition: Header<'static>,
}

#[get("/materials/<path..>?<download>")]
pub async fn serve_material(
    path: PathBuf,
    download: Option<bool>,
    store: &State<ObjectStore>,
) -> Result<StoredFile, Status> {
    let key = path.to_string_lossy().replace('\\', "/");
    let target = store.open(&key).await.map_err(|e| AppError::from(e).status_code())?;

    let file = NamedFile::open(&target)
        .await
        .map_err(|_| Status::NotFound)?;

    let kind = if download.unwrap_or(false) {
        "attachment"
    } else {
        "inline"
    };

    Ok(StoredFile {
        inner: file,
        disposition: Header::new(
            "Content-Disposition",
            format!("{}; filename=\"{}\"", kind, file_name(&key)),
        ),
    })
}
