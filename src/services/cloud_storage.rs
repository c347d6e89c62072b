use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use log::{error, info};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::errors::AppError;
use crate::services::word_processing::DOCX_MIME;

pub const VIDEO_EXTENSIONS: [&str; 7] = [".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv", ".webm"];

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CloudFile {
    pub name: String,
    pub path: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub url: String,
    pub content_type: String,
}

impl CloudFile {
    /// File name up to the extension ("ABB1.2.png" -> "ABB1.2").
    pub fn stem(&self) -> &str {
        file_stem(&self.name)
    }
}

pub fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModuleContent {
    pub module_name: String,
    pub images: Vec<CloudFile>,
    pub articles: Vec<CloudFile>,
    pub videos: Vec<CloudFile>,
}

/// One object returned by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ParsedCloudUrl {
    pub bucket_name: String,
    pub module_name: String,
    pub file_name: String,
    pub object_key: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CloudUrlValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub parsed_info: Option<ParsedCloudUrl>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VideoReference {
    pub object_key: String,
    pub filename: String,
    pub title: String,
}

/// Folder conventions of the content bucket:
/// `<base>/<module>/{Bilder,Artikel,Videos}/<file>`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub bucket: String,
    pub base_path: String,
    pub images_folder: String,
    pub articles_folder: String,
    pub videos_folder: String,
    pub endpoint_url: String,
}

impl From<&StorageConfig> for StorageLayout {
    fn from(config: &StorageConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            base_path: config.base_path.trim_matches('/').to_string(),
            images_folder: config.images_folder.clone(),
            articles_folder: config.articles_folder.clone(),
            videos_folder: config.videos_folder.clone(),
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
        }
    }
}

impl StorageLayout {
    pub fn modules_prefix(&self) -> String {
        format!("{}/", self.base_path)
    }

    pub fn folder_prefix(&self, module_name: &str, folder: &str) -> String {
        format!("{}/{}/{}/", self.base_path, module_name, folder)
    }

    /// "Lerninhalte/SQL/" -> "SQL"
    pub fn module_name_from_prefix(&self, prefix: &str) -> String {
        prefix
            .strip_prefix(&self.modules_prefix())
            .unwrap_or(prefix)
            .trim_end_matches('/')
            .to_string()
    }

    /// Public object URL; the provider serves public objects without the `s3.` host prefix.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint_url.replace("s3.", ""), self.bucket, key)
    }

    fn bucket_prefix(&self) -> String {
        format!("{}/{}/", self.endpoint_url, self.bucket)
    }

    /// Splits `https://host/<bucket>/<base>/<module>/.../<file>` into its parts.
    pub fn parse_cloud_url(&self, cloud_url: &str) -> Result<ParsedCloudUrl, AppError> {
        let parsed = url::Url::parse(cloud_url)
            .map_err(|e| AppError::BadRequest(format!("Invalid cloud URL: {}", e)))?;
        let parts: Vec<String> = parsed
            .path()
            .trim_matches('/')
            .split('/')
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
            .collect();

        if parts.len() < 4 {
            return Err(AppError::BadRequest(format!(
                "Cloud URL path has {} segments, expected at least 4",
                parts.len()
            )));
        }

        Ok(ParsedCloudUrl {
            bucket_name: parts[0].clone(),
            module_name: parts[2].clone(),
            file_name: parts[parts.len() - 1].clone(),
            object_key: parts[1..].join("/"),
        })
    }

    pub fn validate_cloud_url(&self, cloud_url: &str) -> CloudUrlValidation {
        let invalid = |msg: String| CloudUrlValidation { valid: false, errors: vec![msg], parsed_info: None };

        if !cloud_url.starts_with("https://") {
            return invalid("URL must start with https://".into());
        }
        let parsed = match self.parse_cloud_url(cloud_url) {
            Ok(parsed) => parsed,
            Err(e) => return invalid(format!("URL could not be parsed: {}", e.message())),
        };
        if !parsed.file_name.to_lowercase().ends_with(".docx") {
            return invalid("URL must point to a .docx file".into());
        }

        CloudUrlValidation { valid: true, errors: Vec::new(), parsed_info: Some(parsed) }
    }

    /// Checks that a video URL lives in this bucket and names a video file.
    pub fn video_reference(&self, video_url: &str) -> Result<VideoReference, AppError> {
        let prefix = self.bucket_prefix();
        let encoded_key = video_url.strip_prefix(&prefix).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid cloud URL, must start with {}", prefix))
        })?;

        let object_key = percent_decode_str(encoded_key).decode_utf8_lossy().into_owned();
        let filename = object_key.rsplit('/').next().unwrap_or_default().to_string();
        let lower = filename.to_lowercase();
        if !VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Err(AppError::BadRequest(
                "Not a video file. Supported formats: mp4, avi, mov, mkv, wmv, flv, webm".into(),
            ));
        }

        Ok(VideoReference { title: file_stem(&filename).to_string(), object_key, filename })
    }
}

fn image_content_type(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

fn video_content_type(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).as_deref() {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

/// Access to the content bucket. Listing and transfer are implemented per
/// backend; module discovery is built on top of them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn layout(&self) -> &StorageLayout;

    async fn test_connection(&self) -> Result<(), AppError>;

    /// Common prefixes directly below `prefix`.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, AppError>;

    /// Every object below `prefix`, following pagination.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, AppError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;

    async fn object_exists(&self, key: &str) -> Result<bool, AppError>;

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError>;

    async fn list_modules(&self) -> Result<Vec<String>, AppError> {
        let layout = self.layout();
        let prefixes = self.list_prefixes(&layout.modules_prefix()).await?;
        let modules: Vec<String> = prefixes
            .iter()
            .map(|p| layout.module_name_from_prefix(p))
            .filter(|name| !name.is_empty())
            .collect();
        info!("Found {} modules in storage", modules.len());
        Ok(modules)
    }

    async fn module_content(&self, module_name: &str) -> Result<ModuleContent, AppError> {
        let layout = self.layout();
        let to_file = |entry: ObjectEntry, content_type: &str| CloudFile {
            name: entry.key.rsplit('/').next().unwrap_or_default().to_string(),
            url: layout.public_url(&entry.key),
            path: entry.key,
            size: entry.size,
            last_modified: entry.last_modified,
            content_type: content_type.to_string(),
        };
        let files = |entries: Vec<ObjectEntry>| entries.into_iter().filter(|e| !e.key.ends_with('/'));

        let images = files(self.list_objects(&layout.folder_prefix(module_name, &layout.images_folder)).await?)
            .map(|e| {
                let content_type = image_content_type(&e.key);
                to_file(e, content_type)
            })
            .collect::<Vec<_>>();

        let articles = files(self.list_objects(&layout.folder_prefix(module_name, &layout.articles_folder)).await?)
            .filter(|e| e.key.to_lowercase().ends_with(".docx"))
            .map(|e| to_file(e, DOCX_MIME))
            .collect::<Vec<_>>();

        let videos = files(self.list_objects(&layout.folder_prefix(module_name, &layout.videos_folder)).await?)
            .filter(|e| {
                let key = e.key.to_lowercase();
                VIDEO_EXTENSIONS.iter().any(|ext| key.ends_with(ext))
            })
            .map(|e| {
                let content_type = video_content_type(&e.key);
                to_file(e, content_type)
            })
            .collect::<Vec<_>>();

        info!(
            "Module {}: {} images, {} articles, {} videos",
            module_name,
            images.len(),
            articles.len(),
            videos.len()
        );

        Ok(ModuleContent { module_name: module_name.to_string(), images, articles, videos })
    }
}

pub struct S3ContentStore {
    client: S3Client,
    layout: StorageLayout,
}

impl S3ContentStore {
    pub fn new(client: S3Client, layout: StorageLayout) -> Self {
        Self { client, layout }
    }
}

fn storage_error<E: std::error::Error>(context: &str, err: E) -> AppError {
    let msg = format!("{}: {}", context, DisplayErrorContext(err));
    error!("{}", msg);
    AppError::StorageError(msg)
}

fn to_chrono(value: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

#[async_trait]
impl ContentStore for S3ContentStore {
    fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        self.client
            .head_bucket()
            .bucket(&self.layout.bucket)
            .send()
            .await
            .map_err(|e| storage_error("Bucket not reachable", e))?;
        info!("Connected to bucket {}", self.layout.bucket);
        Ok(())
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.layout.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| storage_error("Listing prefixes failed", e))?;

            prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(String::from)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(prefixes)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, AppError> {
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.layout.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| storage_error("Listing objects failed", e))?;

            entries.extend(output.contents().iter().filter_map(|obj| {
                Some(ObjectEntry {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified: to_chrono(obj.last_modified()),
                })
            }));

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(entries)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.layout.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |s| s.is_no_such_key()) {
                    AppError::NotFound(format!("Object {} not found", key))
                } else {
                    storage_error("Download failed", e)
                }
            })?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| storage_error("Reading object body failed", e))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, AppError> {
        match self.client.head_object().bucket(&self.layout.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map_or(false, |s| s.is_not_found()) => Ok(false),
            Err(e) => Err(storage_error("Head object failed", e)),
        }
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| storage_error("Invalid presign duration", e))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.layout.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| storage_error("Presigning failed", e))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn layout() -> StorageLayout {
        StorageLayout {
            bucket: "dsp-e-learning".into(),
            base_path: "Lerninhalte".into(),
            images_folder: "Bilder".into(),
            articles_folder: "Artikel".into(),
            videos_folder: "Videos".into(),
            endpoint_url: "https://s3.eu-central-2.wasabisys.com".into(),
        }
    }

    /// In-memory bucket keyed by object key.
    pub(crate) struct MemoryStore {
        pub layout: StorageLayout,
        pub objects: HashMap<String, Vec<u8>>,
        pub reachable: bool,
    }

    impl MemoryStore {
        pub(crate) fn new(objects: Vec<(&str, Vec<u8>)>) -> Self {
            Self {
                layout: layout(),
                objects: objects.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                reachable: true,
            }
        }
    }

    #[async_trait]
    impl ContentStore for MemoryStore {
        fn layout(&self) -> &StorageLayout {
            &self.layout
        }

        async fn test_connection(&self) -> Result<(), AppError> {
            if self.reachable {
                Ok(())
            } else {
                Err(AppError::StorageError("unreachable".into()))
            }
        }

        async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, AppError> {
            let mut prefixes: Vec<String> = self
                .objects
                .keys()
                .filter_map(|k| k.strip_prefix(prefix))
                .filter_map(|rest| rest.split_once('/').map(|(head, _)| format!("{}{}/", prefix, head)))
                .collect();
            prefixes.sort();
            prefixes.dedup();
            Ok(prefixes)
        }

        async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, AppError> {
            let mut entries: Vec<ObjectEntry> = self
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| ObjectEntry { key: k.clone(), size: v.len() as i64, last_modified: None })
                .collect();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        }

        async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Object {} not found", key)))
        }

        async fn object_exists(&self, key: &str) -> Result<bool, AppError> {
            Ok(self.objects.contains_key(key))
        }

        async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
            Ok(format!("{}?expires={}", self.layout.public_url(key), expires_in.as_secs()))
        }
    }

    #[test]
    fn stem_cuts_at_last_dot() {
        assert_eq!(file_stem("ABB1.2.png"), "ABB1.2");
        assert_eq!(file_stem("ABB3.png"), "ABB3");
        assert_eq!(file_stem("1.1 Joins.docx"), "1.1 Joins");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn public_url_drops_s3_host_prefix() {
        assert_eq!(
            layout().public_url("Lerninhalte/SQL/Bilder/ABB1.png"),
            "https://eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Bilder/ABB1.png"
        );
    }

    #[test]
    fn parses_cloud_url_with_encoded_spaces() {
        let parsed = layout()
            .parse_cloud_url(
                "https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Artikel/1.1%20Installation%20und%20erste%20Schritte.docx",
            )
            .unwrap();
        assert_eq!(parsed.bucket_name, "dsp-e-learning");
        assert_eq!(parsed.module_name, "SQL");
        assert_eq!(parsed.file_name, "1.1 Installation und erste Schritte.docx");
        assert_eq!(parsed.object_key, "Lerninhalte/SQL/Artikel/1.1 Installation und erste Schritte.docx");
    }

    #[test]
    fn short_cloud_url_is_rejected() {
        assert!(layout().parse_cloud_url("https://host/bucket/file.docx").is_err());
    }

    #[test]
    fn cloud_url_validation() {
        let l = layout();
        assert!(!l.validate_cloud_url("http://host/b/L/M/a.docx").valid);
        assert!(!l.validate_cloud_url("https://host/b/L/M/a.pdf").valid);
        let ok = l.validate_cloud_url("https://host/b/L/M/Artikel/a.docx");
        assert!(ok.valid);
        assert_eq!(ok.parsed_info.unwrap().module_name, "M");
    }

    #[test]
    fn video_reference_requires_bucket_prefix_and_extension() {
        let l = layout();
        let video = l
            .video_reference("https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Videos/1.1 Einführung.mp4")
            .unwrap();
        assert_eq!(video.object_key, "Lerninhalte/SQL/Videos/1.1 Einführung.mp4");
        assert_eq!(video.filename, "1.1 Einführung.mp4");
        assert_eq!(video.title, "1.1 Einführung");

        assert!(l.video_reference("https://example.com/dsp-e-learning/a.mp4").is_err());
        assert!(l
            .video_reference("https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Videos/notes.txt")
            .is_err());
    }

    #[tokio::test]
    async fn module_content_sorts_files_into_folders() {
        let store = MemoryStore::new(vec![
            ("Lerninhalte/SQL/", vec![]),
            ("Lerninhalte/SQL/Bilder/", vec![]),
            ("Lerninhalte/SQL/Bilder/ABB1.1.png", vec![1, 2]),
            ("Lerninhalte/SQL/Artikel/1.1 Intro.docx", vec![3]),
            ("Lerninhalte/SQL/Artikel/notes.txt", vec![4]),
            ("Lerninhalte/SQL/Videos/1.1 Intro.webm", vec![5]),
            ("Lerninhalte/Python/Artikel/x.docx", vec![6]),
        ]);

        let modules = store.list_modules().await.unwrap();
        assert_eq!(modules, vec!["Python".to_string(), "SQL".to_string()]);

        let content = store.module_content("SQL").await.unwrap();
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].name, "ABB1.1.png");
        assert_eq!(content.images[0].stem(), "ABB1.1");
        assert_eq!(content.articles.len(), 1);
        assert_eq!(content.articles[0].content_type, DOCX_MIME);
        assert_eq!(content.videos.len(), 1);
        assert_eq!(content.videos[0].content_type, "video/webm");
    }
}
