//! Media references and media-type classification.

use crate::chunk::ChunkId;
use crate::todo::TodoId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag written next to every persisted todo row.
pub const MEDIA_SCHEMA_VERSION: i64 = 1;

/// Key prefix of file-area attachments.
pub const FILE_AREA_PREFIX: &str = "attachments/";

/// Content types of the matroska container that do not carry a `video/` prefix.
const MATROSKA_TYPES: &[&str] = &["application/x-matroska"];

/// File extensions treated as matroska video when the content type is missing.
const MATROSKA_EXTENSIONS: &[&str] = &["mkv", "mk3d", "mka"];

/// Longest file-area name component kept from the original file name.
const MAX_NAME_LEN: usize = 200;

/// How an attachment's bytes are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fixed-size chunks in the chunk store.
    #[default]
    Chunked,
    /// One entry in the hierarchical file area.
    FileArea,
    /// Whole payload embedded in the metadata record.
    Inline,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::FileArea => "file_area",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attachment's bytes live and how to interpret them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MediaRef {
    Chunked {
        #[serde(rename = "type")]
        content_type: String,
        name: String,
        size: u64,
        #[serde(rename = "chunkIds")]
        chunk_ids: Vec<ChunkId>,
    },
    FileArea {
        #[serde(rename = "type")]
        content_type: String,
        /// Storage path inside the file area.
        name: String,
        size: u64,
    },
    Inline {
        #[serde(rename = "type")]
        content_type: String,
        name: String,
        size: u64,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl MediaRef {
    /// MIME type recorded at upload time.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Chunked { content_type, .. }
            | Self::FileArea { content_type, .. }
            | Self::Inline { content_type, .. } => content_type,
        }
    }

    /// File name (file-area: the storage path).
    pub fn name(&self) -> &str {
        match self {
            Self::Chunked { name, .. } | Self::FileArea { name, .. } | Self::Inline { name, .. } => {
                name
            }
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Chunked { size, .. } | Self::FileArea { size, .. } | Self::Inline { size, .. } => {
                *size
            }
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Chunked { .. } => Strategy::Chunked,
            Self::FileArea { .. } => Strategy::FileArea,
            Self::Inline { .. } => Strategy::Inline,
        }
    }

    /// Chunk ids referenced by this media, empty for other strategies.
    pub fn chunk_ids(&self) -> &[ChunkId] {
        match self {
            Self::Chunked { chunk_ids, .. } => chunk_ids,
            _ => &[],
        }
    }

    /// Display classification.
    pub fn kind(&self) -> MediaKind {
        MediaKind::classify(self.content_type(), self.name())
    }

    /// Encode in the canonical tagged schema.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Decode the canonical schema, falling back to the untagged legacy shapes.
    ///
    /// Legacy shapes: `chunkIds` present means chunked, `data` present means
    /// inline, neither means a file-area path.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        if value.get("strategy").is_some() {
            return serde_json::from_value(value)
                .map_err(|e| crate::Error::Serialization(e.to_string()));
        }

        let legacy: LegacyMedia = serde_json::from_value(value)
            .map_err(|e| crate::Error::Serialization(format!("legacy media: {e}")))?;
        Ok(match (legacy.chunk_ids, legacy.data) {
            (Some(chunk_ids), _) => Self::Chunked {
                content_type: legacy.content_type,
                name: legacy.name,
                size: legacy.size,
                chunk_ids,
            },
            (None, Some(data)) => Self::Inline {
                content_type: legacy.content_type,
                name: legacy.name,
                size: legacy.size,
                data: data.into_bytes()?,
            },
            (None, None) => Self::FileArea {
                content_type: legacy.content_type,
                name: legacy.name,
                size: legacy.size,
            },
        })
    }
}

impl fmt::Debug for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MediaRef");
        s.field("strategy", &self.strategy())
            .field("type", &self.content_type())
            .field("name", &self.name())
            .field("size", &self.size());
        if let Self::Chunked { chunk_ids, .. } = self {
            s.field("chunks", &chunk_ids.len());
        }
        s.finish()
    }
}

#[derive(Deserialize)]
struct LegacyMedia {
    #[serde(rename = "type", default)]
    content_type: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "chunkIds")]
    chunk_ids: Option<Vec<ChunkId>>,
    data: Option<LegacyData>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyData {
    Base64(String),
    Bytes(Vec<u8>),
}

impl LegacyData {
    fn into_bytes(self) -> crate::Result<Vec<u8>> {
        use base64::Engine;
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Base64(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| crate::Error::Serialization(format!("legacy inline data: {e}"))),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// How an attachment is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    /// Generic file info plus a download action.
    File,
}

impl MediaKind {
    /// Classify by MIME prefix, with the matroska container special-cased.
    ///
    /// An empty content type falls back to the file extension for matroska only.
    pub fn classify(content_type: &str, name: &str) -> Self {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            Self::Image
        } else if content_type.starts_with("audio/") {
            Self::Audio
        } else if content_type.starts_with("video/") || MATROSKA_TYPES.contains(&content_type.as_str())
        {
            Self::Video
        } else if content_type.is_empty() && has_matroska_extension(name) {
            Self::Video
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

fn has_matroska_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| MATROSKA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Label of the generic download presentation, e.g. `File: a.pdf (1.50 MB)`.
pub fn file_info_label(name: &str, size: u64) -> String {
    format!("File: {} ({:.2} MB)", name, size as f64 / 1024.0 / 1024.0)
}

/// Reduce an uploaded file name to one safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_start_matches('.').trim().to_string();
    if cleaned.is_empty() {
        return "attachment".to_string();
    }
    if cleaned.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }
    cleaned
}

/// File-area key for an attachment of todo `id`: `attachments/<id>_<name>`.
pub fn file_area_key(id: TodoId, original_name: &str) -> String {
    format!("{FILE_AREA_PREFIX}{id}_{}", sanitize_file_name(original_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked() -> MediaRef {
        MediaRef::Chunked {
            content_type: "video/mp4".to_string(),
            name: "clip.mp4".to_string(),
            size: 2_621_440,
            chunk_ids: (0..3).map(|i| ChunkId::new(TodoId::from_raw(99), i)).collect(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(MediaKind::classify("image/png", "a.png"), MediaKind::Image);
        assert_eq!(MediaKind::classify("IMAGE/JPEG", "a.jpg"), MediaKind::Image);
        assert_eq!(MediaKind::classify("audio/mpeg", "a.mp3"), MediaKind::Audio);
        assert_eq!(MediaKind::classify("video/mp4", "a.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::classify("video/x-matroska", "a.mkv"), MediaKind::Video);
        assert_eq!(
            MediaKind::classify("application/x-matroska", "a.mkv"),
            MediaKind::Video
        );
        assert_eq!(MediaKind::classify("", "movie.MKV"), MediaKind::Video);
        assert_eq!(MediaKind::classify("application/pdf", "a.pdf"), MediaKind::File);
        assert_eq!(MediaKind::classify("", "notes.txt"), MediaKind::File);
        assert_eq!(MediaKind::classify("imagery/png", "a.png"), MediaKind::File);
    }

    #[test]
    fn test_file_info_label() {
        assert_eq!(file_info_label("a.pdf", 1_572_864), "File: a.pdf (1.50 MB)");
        assert_eq!(file_info_label("empty", 0), "File: empty (0.00 MB)");
    }

    #[test]
    fn test_canonical_json_is_tagged() {
        let json = chunked().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["strategy"], "chunked");
        assert_eq!(value["type"], "video/mp4");
        assert_eq!(value["chunkIds"][2], "99_2");
        assert_eq!(MediaRef::from_json(&json).unwrap(), chunked());
    }

    #[test]
    fn test_inline_data_is_base64() {
        let media = MediaRef::Inline {
            content_type: "text/plain".to_string(),
            name: "hi.txt".to_string(),
            size: 2,
            data: b"hi".to_vec(),
        };
        let json = media.to_json().unwrap();
        assert!(json.contains("\"data\":\"aGk=\""), "{json}");
        assert_eq!(MediaRef::from_json(&json).unwrap(), media);
    }

    #[test]
    fn test_legacy_shapes_decode() {
        let chunked_legacy =
            r#"{"type":"video/mp4","name":"clip.mp4","size":2621440,"chunkIds":["99_0","99_1","99_2"]}"#;
        assert_eq!(MediaRef::from_json(chunked_legacy).unwrap(), chunked());

        let file_legacy = r#"{"type":"image/png","name":"1700000000000_cat.png","size":10}"#;
        let media = MediaRef::from_json(file_legacy).unwrap();
        assert_eq!(media.strategy(), Strategy::FileArea);
        assert_eq!(media.name(), "1700000000000_cat.png");

        let inline_legacy = r#"{"type":"text/plain","name":"a.txt","size":3,"data":[1,2,3]}"#;
        let media = MediaRef::from_json(inline_legacy).unwrap();
        assert_eq!(media.strategy(), Strategy::Inline);
        assert!(matches!(media, MediaRef::Inline { ref data, .. } if data == &[1, 2, 3]));

        assert!(MediaRef::from_json(r#"{"size":3}"#).is_err());
        assert!(MediaRef::from_json("not json").is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("cat.png"), "cat.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(".."), "attachment");
        assert_eq!(sanitize_file_name(""), "attachment");
        assert_eq!(sanitize_file_name("a\nb"), "a_b");
        assert!(sanitize_file_name(&"é".repeat(300)).len() <= MAX_NAME_LEN);
    }

    #[test]
    fn test_file_area_key() {
        let key = file_area_key(TodoId::from_raw(5), "dir/photo.jpg");
        assert_eq!(key, "attachments/5_photo.jpg");
        assert!(!key[FILE_AREA_PREFIX.len()..].contains('/'));
    }
}
