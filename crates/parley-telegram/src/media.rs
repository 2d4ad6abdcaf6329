// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image extraction for Telegram messages.
//!
//! Photos, stickers, and image documents are downloaded from Telegram and
//! handed to the model inline as base64 `data:` URLs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parley_core::{ImageRef, ParleyError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileMeta;
use tracing::debug;

/// A downloadable image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub file: FileMeta,
    pub mime_type: String,
}

/// The image carried by `msg`, if any.
///
/// Telegram sends several photo sizes; the last is the largest.
pub fn image_source(msg: &Message) -> Option<ImageSource> {
    if let Some(largest) = msg.photo().and_then(<[_]>::last) {
        return Some(ImageSource {
            file: largest.file.clone(),
            mime_type: "image/jpeg".into(),
        });
    }
    if let Some(sticker) = msg.sticker() {
        return Some(ImageSource {
            file: sticker.file.clone(),
            mime_type: "image/webp".into(),
        });
    }
    let doc = msg.document()?;
    let mime = doc.mime_type.as_ref()?.to_string();
    mime.starts_with("image/").then(|| ImageSource {
        file: doc.file.clone(),
        mime_type: mime,
    })
}

/// The message whose image a turn should use.
///
/// A reply to an image message uses the replied image; otherwise the
/// message's own attachment, if any.
pub fn image_message(msg: &Message) -> Option<&Message> {
    match msg.reply_to_message() {
        Some(reply) if image_source(reply).is_some() => Some(reply),
        _ => image_source(msg).map(|_| msg),
    }
}

/// Downloads a file from Telegram servers by its file metadata.
pub async fn download_file(bot: &Bot, file_meta: &FileMeta) -> Result<Vec<u8>, ParleyError> {
    let file = bot
        .get_file(file_meta.id.clone())
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(
        file_id = %file_meta.id,
        size = buf.len(),
        "downloaded file from Telegram"
    );
    Ok(buf)
}

/// Downloads `source` and encodes it for the completion request.
pub async fn fetch_image(bot: &Bot, source: &ImageSource) -> Result<ImageRef, ParleyError> {
    let data = download_file(bot, &source.file).await?;
    Ok(encode_image(&source.mime_type, &data))
}

pub fn encode_image(mime_type: &str, data: &[u8]) -> ImageRef {
    ImageRef::from_base64(mime_type, &STANDARD.encode(data))
}
