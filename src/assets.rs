#![forbid(unsafe_code)]

//! Static page and stylesheet served next to the JSON API.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use mime_guess::MimeGuess;

pub const INDEX_ASSET: &str = "index.html";
pub const STYLESHEET_ASSET: &str = "style.css";

pub struct AssetStore {
    root: PathBuf,
}

/// A loaded asset with the content type guessed from its file name.
#[derive(Debug, Clone)]
pub struct Asset {
    pub content_type: String,
    pub body: String,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads `name` from the asset root on every call, so edits show up
    /// without a restart.
    pub async fn load(&self, name: &str) -> Result<Asset> {
        let path = self.root.join(name);
        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading asset {}", path.display()))?;
        let content_type = MimeGuess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Asset { content_type, body })
    }
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}
