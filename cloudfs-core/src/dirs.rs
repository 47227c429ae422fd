// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directory emulation for flat object stores
//!
//! A directory `D` exists when the marker object `D/<marker>` exists or when
//! any key starts with `D/`. `mkdir` writes the zero-byte marker so empty
//! directories stay visible; `rmdir` removes it once nothing else is left.
//! A zero-byte object named `D/` itself, as storage consoles create for
//! folders, counts as a second marker.
//!
//! Nothing here is serialized across callers. Object stores offer no lock,
//! so two concurrent `mkdir(D, exist_ok = false)` calls can both see `D`
//! absent and both succeed, and a file written under `D/` while `rmdir` is
//! running can survive the marker delete. These races are accepted.

use bytes::Bytes;
use futures::StreamExt;

use crate::{
    error::{CloudFsError, CloudFsResult},
    glob::{self, GlobPattern},
    object::ObjectPath,
    operations::{DeleteOptions, GlobOptions, RequestOptions},
};

/// File semantics: the exact key exists. Directory-like addresses are never files.
pub async fn is_file(path: &ObjectPath, request: &RequestOptions) -> bool {
    if path.address().is_dir_like() {
        return false;
    }
    path.store().exists(path.bucket(), path.key(), request).await
}

/// Marker lookup first, then a short-circuiting scan of `D/*`.
pub async fn is_dir(path: &ObjectPath, request: &RequestOptions) -> CloudFsResult<bool> {
    let dir = path.as_dir();
    if dir.is_root() {
        return Ok(true);
    }

    let marker = dir.marker_path();
    if path.store().exists(marker.bucket(), marker.key(), request).await {
        return Ok(true);
    }

    let mut children = glob::keys(
        dir.clone(),
        GlobPattern::children_of(dir.key()),
        GlobOptions::default().with_markers(),
        request,
    );
    match children.next().await {
        Some(Ok(_)) => Ok(true),
        Some(Err(err)) => Err(err),
        None => Ok(false),
    }
}

/// Directory-like addresses check `is_dir`, everything else `is_file`.
pub async fn exists(path: &ObjectPath, request: &RequestOptions) -> CloudFsResult<bool> {
    if path.address().is_dir_like() {
        is_dir(path, request).await
    } else {
        Ok(is_file(path, request).await)
    }
}

/// Create the directory marker.
///
/// `parents` is accepted for parity with local paths; object stores have no
/// parent objects to create.
pub async fn mkdir(
    path: &ObjectPath,
    _parents: bool,
    exist_ok: bool,
    request: &RequestOptions,
) -> CloudFsResult<()> {
    let dir = path.as_dir();
    if is_dir(&dir, request).await? {
        if exist_ok {
            return Ok(());
        }
        return Err(CloudFsError::AlreadyExists(dir.to_string()));
    }

    let marker = dir.marker_path();
    tracing::debug!("Creating directory marker {}", marker);
    dir.store()
        .put(marker.bucket(), marker.key(), Bytes::new(), request)
        .await?;
    Ok(())
}

/// Remove an empty directory. The only occupant allowed is the marker.
pub async fn rmdir(path: &ObjectPath, request: &RequestOptions) -> CloudFsResult<()> {
    let dir = path.as_dir();
    if dir.is_root() {
        return Err(CloudFsError::Unsupported(format!("cannot remove bucket root {}", dir)));
    }
    if !is_dir(&dir, request).await? {
        return Err(CloudFsError::NotFound(dir.to_string()));
    }

    // Walk every entry; a partial scan could miss a late page.
    let mut entries = glob::keys(
        dir.clone(),
        GlobPattern::children_of(dir.key()),
        GlobOptions::default().with_markers(),
        request,
    );
    let marker_key = dir.marker_path().key().to_string();
    let mut markers = Vec::new();
    let mut occupants = 0usize;
    while let Some(key) = entries.next().await {
        let key = key?;
        if key == marker_key || key == dir.key() {
            markers.push(key);
        } else {
            occupants += 1;
        }
    }
    if occupants > 0 {
        return Err(CloudFsError::DirectoryNotEmpty(dir.to_string()));
    }

    let options = DeleteOptions { missing_ok: true, request: request.clone() };
    for key in markers {
        tracing::debug!("Removing directory marker {}", dir.with_key(&key));
        dir.store().delete(dir.bucket(), &key, &options).await?;
    }
    Ok(())
}

/// Create an empty object unless one is already there.
pub async fn touch(path: &ObjectPath, exist_ok: bool, request: &RequestOptions) -> CloudFsResult<()> {
    if path.address().is_dir_like() {
        return Err(CloudFsError::IsADirectory(path.to_string()));
    }
    if is_file(path, request).await {
        if exist_ok {
            return Ok(());
        }
        return Err(CloudFsError::AlreadyExists(path.to_string()));
    }
    path.store().put(path.bucket(), path.key(), Bytes::new(), request).await?;
    Ok(())
}

/// Delete one object. Directory keys and markers are refused.
pub async fn unlink(path: &ObjectPath, missing_ok: bool, request: &RequestOptions) -> CloudFsResult<()> {
    if path.address().is_dir_like() || path.name() == Some(path.marker()) {
        return Err(CloudFsError::IsADirectory(path.to_string()));
    }
    if !is_file(path, request).await {
        if missing_ok {
            return Ok(());
        }
        return Err(CloudFsError::NotFound(path.to_string()));
    }

    tracing::debug!("Deleting {}", path);
    let options = DeleteOptions { missing_ok, request: request.clone() };
    path.store().delete(path.bucket(), path.key(), &options).await
}
