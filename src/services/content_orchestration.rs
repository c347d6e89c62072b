//! Pipeline from the content bucket into the e-learning tables: list a
//! module's files, turn its Word articles into content blocks and store
//! articles and images.

use log::{error, info, warn};
use serde::Serialize;

use crate::errors::AppError;
use crate::services::cloud_storage::{file_stem, CloudFile, ContentStore};
use crate::services::content_repository::{
    validate_module_data, ArticleRecord, ContentRepository, ImageRecord, ModuleStatistics,
};
use crate::services::word_extraction::extract_content;
use crate::services::word_processing::process_word_document;

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ProcessingResult {
    pub success: bool,
    pub module_name: String,
    pub images_processed: usize,
    pub articles_processed: usize,
    pub images_saved: usize,
    pub articles_saved: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ArticleProcessingResult {
    pub success: bool,
    pub article_title: String,
    pub article_id: Option<i64>,
    pub images_found: Vec<String>,
    pub images_saved: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CleanupResult {
    pub success: bool,
    pub module_name: String,
    pub cleaned_images: u64,
    pub current_images_count: usize,
    pub current_articles_count: usize,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub cloud_storage: bool,
    pub word_processing: bool,
    pub database: bool,
}

impl ServiceStatus {
    pub fn all_ok(&self) -> bool {
        self.cloud_storage && self.word_processing && self.database
    }
}

fn image_record(file: &CloudFile) -> ImageRecord {
    ImageRecord { name: file.name.clone(), url: file.url.clone() }
}

pub struct ContentOrchestrator<'a> {
    store: &'a dyn ContentStore,
    repo: &'a dyn ContentRepository,
}

impl<'a> ContentOrchestrator<'a> {
    pub fn new(store: &'a dyn ContentStore, repo: &'a dyn ContentRepository) -> Self {
        Self { store, repo }
    }

    /// Downloads and converts every article of a module. Articles that fail
    /// are skipped with a warning.
    async fn process_articles(&self, articles: &[CloudFile], warnings: &mut Vec<String>) -> Vec<ArticleRecord> {
        let mut records = Vec::with_capacity(articles.len());
        for file in articles {
            let bytes = match self.store.download(&file.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping article {}: {}", file.name, e);
                    warnings.push(format!("Article {} could not be downloaded: {}", file.name, e.message()));
                    continue;
                }
            };
            match process_word_document(&bytes, &file.name, &file.url) {
                Ok(article) => records.push(ArticleRecord {
                    title: article.title,
                    url: article.url,
                    json_content: serde_json::to_value(&article.json_content).ok(),
                }),
                Err(e) => {
                    warn!("Skipping article {}: {}", file.name, e);
                    warnings.push(format!("Article {} could not be processed: {}", file.name, e.message()));
                }
            }
        }
        records
    }

    pub async fn process_module_content(&self, module_name: &str) -> ProcessingResult {
        info!("Processing module {}", module_name);
        let mut result = ProcessingResult { module_name: module_name.to_string(), ..Default::default() };

        if let Err(e) = self.store.test_connection().await {
            result.errors.push(format!("Cloud storage connection failed: {}", e.message()));
            return result;
        }

        let content = match self.store.module_content(module_name).await {
            Ok(content) => content,
            Err(e) => {
                result.errors.push(format!("No content found for module {}: {}", module_name, e.message()));
                return result;
            }
        };

        let images: Vec<ImageRecord> = content.images.iter().map(image_record).collect();
        result.images_processed = images.len();

        let articles = self.process_articles(&content.articles, &mut result.warnings).await;
        result.articles_processed = articles.len();

        let validation = validate_module_data(module_name, &images, &articles);
        if !validation.valid {
            result.errors.extend(validation.errors);
            return result;
        }
        result.warnings.extend(validation.warnings);

        let saved = async {
            let module = self.repo.get_or_create_module(module_name).await?;
            let images_saved = self.repo.save_article_images(module.id, &images).await?;
            let articles_saved = self.repo.save_articles(module.id, &articles).await?.len();
            Ok::<_, AppError>((images_saved, articles_saved))
        }
        .await;

        match saved {
            Ok((images_saved, articles_saved)) => {
                result.success = true;
                result.images_saved = images_saved;
                result.articles_saved = articles_saved;
                info!(
                    "Module {} processed: {} images, {} articles",
                    module_name, images_saved, articles_saved
                );
            }
            Err(e) => {
                error!("Saving module {} failed: {}", module_name, e);
                result.errors.push(e.message().to_string());
            }
        }
        result
    }

    pub async fn process_multiple_modules(&self, module_names: &[String]) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(module_names.len());
        for name in module_names {
            let result = self.process_module_content(name).await;
            if !result.success {
                error!("Module {} failed: {:?}", name, result.errors);
            }
            results.push(result);
        }
        results
    }

    pub async fn available_modules(&self) -> Result<Vec<String>, AppError> {
        self.store.list_modules().await
    }

    pub async fn module_statistics(&self, module_name: &str) -> Result<ModuleStatistics, AppError> {
        self.repo
            .module_statistics(module_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Module {} not found", module_name)))
    }

    pub async fn test_all_services(&self) -> ServiceStatus {
        let cloud_storage = match self.store.test_connection().await {
            Ok(()) => true,
            Err(e) => {
                error!("Cloud storage check failed: {}", e);
                false
            }
        };
        let word_processing = !extract_content("Titel$ Test Titel$").content.is_empty();
        let database = match self.repo.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!("Database check failed: {}", e);
                false
            }
        };
        ServiceStatus { cloud_storage, word_processing, database }
    }

    /// Removes image rows of a module whose file is no longer in storage.
    pub async fn cleanup_module(&self, module_name: &str) -> Result<CleanupResult, AppError> {
        let content = self.store.module_content(module_name).await?;
        let module = self
            .repo
            .module_by_title(module_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Module {} not found in database", module_name)))?;

        let keep: Vec<String> = content.images.iter().map(|i| i.name.clone()).collect();
        let cleaned_images = self.repo.remove_orphaned_images(module.id, &keep).await?;
        info!("Removed {} orphaned images from module {}", cleaned_images, module_name);

        Ok(CleanupResult {
            success: true,
            module_name: module_name.to_string(),
            cleaned_images,
            current_images_count: content.images.len(),
            current_articles_count: content.articles.len(),
        })
    }

    /// Imports one article by its cloud URL into an existing module, together
    /// with the module images it references.
    pub async fn process_article_from_url(&self, module_id: i64, cloud_url: &str) -> ArticleProcessingResult {
        let mut result = ArticleProcessingResult::default();

        let parsed = match self.store.layout().parse_cloud_url(cloud_url) {
            Ok(parsed) => parsed,
            Err(e) => {
                result.errors.push(format!("Invalid cloud URL: {}", e.message()));
                return result;
            }
        };

        let bytes = match self.store.download(&parsed.object_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                result.errors.push(format!("Could not download Word document: {}", e.message()));
                return result;
            }
        };

        let article = match process_word_document(&bytes, &parsed.file_name, cloud_url) {
            Ok(article) => article,
            Err(e) => {
                result.errors.push(format!("Word document processing failed: {}", e.message()));
                return result;
            }
        };
        result.article_title = article.title.clone();
        result.images_found = article
            .json_content
            .extracted
            .image_sources()
            .into_iter()
            .map(|src| file_stem(src).to_string())
            .collect();

        let module = match self.repo.module_by_id(module_id).await {
            Ok(Some(module)) => module,
            Ok(None) => {
                result.errors.push(format!("Module with ID {} not found", module_id));
                return result;
            }
            Err(e) => {
                result.errors.push(e.message().to_string());
                return result;
            }
        };

        let record = ArticleRecord {
            title: article.title.clone(),
            url: cloud_url.to_string(),
            json_content: serde_json::to_value(&article.json_content).ok(),
        };
        match self.repo.save_articles(module.id, &[record]).await {
            Ok(saved) => result.article_id = saved.first().map(|a| a.id),
            Err(e) => {
                result.errors.push(e.message().to_string());
                return result;
            }
        }

        if !result.images_found.is_empty() {
            match self.save_referenced_images(module.id, &parsed.module_name, &result.images_found).await {
                Ok(saved) => result.images_saved = saved,
                Err(e) => {
                    warn!("Images for article {} not saved: {}", article.title, e);
                    result.warnings.push(format!("Images could not be saved: {}", e.message()));
                }
            }
        }

        result.success = true;
        info!("Article '{}' processed", article.title);
        result
    }

    async fn save_referenced_images(&self, module_id: i64, module_name: &str, names: &[String]) -> Result<usize, AppError> {
        let content = self.store.module_content(module_name).await?;
        let matching: Vec<ImageRecord> = content
            .images
            .iter()
            .filter(|image| names.iter().any(|n| n == image.stem()))
            .map(image_record)
            .collect();
        if matching.is_empty() {
            return Ok(0);
        }
        self.repo.save_article_images(module_id, &matching).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cloud_storage::tests::MemoryStore;
    use crate::services::content_repository::tests::MemoryRepository;
    use crate::services::docx::tests::{document_xml, docx_bytes};

    fn sql_store() -> MemoryStore {
        MemoryStore::new(vec![
            ("Lerninhalte/SQL/Bilder/ABB1.1.png", vec![1]),
            ("Lerninhalte/SQL/Bilder/ABB9.png", vec![2]),
            (
                "Lerninhalte/SQL/Artikel/1.1 Einführung.docx",
                docx_bytes(&document_xml(&["Titel$ Einführung Titel$", "Bild$ ABB1.1.png"])),
            ),
        ])
    }

    #[tokio::test]
    async fn processes_whole_module() {
        let store = sql_store();
        let repo = MemoryRepository::default();
        let result = ContentOrchestrator::new(&store, &repo).process_module_content("SQL").await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.images_processed, 2);
        assert_eq!(result.articles_processed, 1);
        assert_eq!(result.images_saved, 2);
        assert_eq!(result.articles_saved, 1);

        let articles = repo.articles.lock().unwrap();
        let (_, article) = articles.iter().next().unwrap();
        assert_eq!(article.title, "Einführung");
        let json = article.json_content.as_ref().unwrap();
        assert_eq!(json["content"][0]["type"], "title");
    }

    #[tokio::test]
    async fn broken_article_is_a_warning() {
        let mut store = sql_store();
        store.objects.insert("Lerninhalte/SQL/Artikel/kaputt.docx".into(), b"nope".to_vec());
        let repo = MemoryRepository::default();
        let result = ContentOrchestrator::new(&store, &repo).process_module_content("SQL").await;

        assert!(result.success);
        assert_eq!(result.articles_processed, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("kaputt.docx"));
    }

    #[tokio::test]
    async fn unreachable_storage_fails_early() {
        let mut store = sql_store();
        store.reachable = false;
        let repo = MemoryRepository::default();
        let result = ContentOrchestrator::new(&store, &repo).process_module_content("SQL").await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(repo.modules.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn article_from_url_saves_referenced_images_only() {
        let store = sql_store();
        let repo = MemoryRepository::with_module(7, "SQL");
        let url = "https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Artikel/1.1%20Einf%C3%BChrung.docx";
        let result = ContentOrchestrator::new(&store, &repo).process_article_from_url(7, url).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.article_title, "Einführung");
        assert_eq!(result.images_found, vec!["ABB1.1".to_string()]);
        assert_eq!(result.images_saved, 1);
        assert!(result.article_id.is_some());
        assert!(repo.images.lock().unwrap().contains_key(&(7, "ABB1.1.png".to_string())));
    }

    #[tokio::test]
    async fn article_for_unknown_module_fails() {
        let store = sql_store();
        let repo = MemoryRepository::default();
        let url = "https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Artikel/1.1%20Einf%C3%BChrung.docx";
        let result = ContentOrchestrator::new(&store, &repo).process_article_from_url(3, url).await;

        assert!(!result.success);
        assert_eq!(result.errors, vec!["Module with ID 3 not found".to_string()]);
    }

    #[tokio::test]
    async fn cleanup_removes_images_missing_from_storage() {
        let store = sql_store();
        let repo = MemoryRepository::with_module(1, "SQL");
        repo.images.lock().unwrap().insert((1, "ALT1.png".into()), "u".into());
        repo.images.lock().unwrap().insert((1, "ABB9.png".into()), "u".into());

        let result = ContentOrchestrator::new(&store, &repo).cleanup_module("SQL").await.unwrap();
        assert_eq!(result.cleaned_images, 1);
        assert_eq!(result.current_images_count, 2);
        assert!(!repo.images.lock().unwrap().contains_key(&(1, "ALT1.png".to_string())));
    }

    #[tokio::test]
    async fn cleanup_of_unknown_module_is_not_found() {
        let store = sql_store();
        let repo = MemoryRepository::default();
        let err = ContentOrchestrator::new(&store, &repo).cleanup_module("SQL").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn service_status_reflects_failures() {
        let store = sql_store();
        let repo = MemoryRepository { fail_ping: true, ..Default::default() };
        let status = ContentOrchestrator::new(&store, &repo).test_all_services().await;
        assert_eq!(status, ServiceStatus { cloud_storage: true, word_processing: true, database: false });
        assert!(!status.all_ok());
    }

    #[tokio::test]
    async fn statistics_for_missing_module_is_not_found() {
        let store = sql_store();
        let repo = MemoryRepository::with_module(1, "SQL");
        let orchestrator = ContentOrchestrator::new(&store, &repo);
        assert_eq!(orchestrator.module_statistics("SQL").await.unwrap().module_id, 1);
        assert!(orchestrator.module_statistics("Python").await.is_err());
        assert_eq!(orchestrator.available_modules().await.unwrap(), vec!["SQL".to_string()]);
    }

    #[tokio::test]
    async fn reprocessing_a_module_does_not_duplicate_rows() {
        let store = sql_store();
        let repo = MemoryRepository::default();
        let orchestrator = ContentOrchestrator::new(&store, &repo);

        let first = orchestrator.process_module_content("SQL").await;
        let before = orchestrator.module_statistics("SQL").await.unwrap();
        let second = orchestrator.process_module_content("SQL").await;
        let after = orchestrator.module_statistics("SQL").await.unwrap();

        assert!(first.success && second.success);
        assert_eq!(repo.modules.lock().unwrap().len(), 1);
        assert_eq!(before.module_id, after.module_id);
        assert_eq!((after.images_count, after.articles_count), (2, 1));
        assert_eq!((before.images_count, before.articles_count), (after.images_count, after.articles_count));
    }

    #[tokio::test]
    async fn repeated_upserts_keep_one_row_each() {
        let repo = MemoryRepository::default();
        let first = repo.get_or_create_module("SQL").await.unwrap();
        let again = repo.get_or_create_module("SQL").await.unwrap();
        assert_eq!(first.id, again.id);

        let images = [ImageRecord { name: "ABB1.png".into(), url: "https://a/ABB1.png".into() }];
        repo.save_article_images(first.id, &images).await.unwrap();
        repo.save_article_images(first.id, &images).await.unwrap();
        assert_eq!(repo.images.lock().unwrap().len(), 1);

        let articles = [ArticleRecord { title: "Joins".into(), url: "https://a/1.docx".into(), json_content: None }];
        let created = repo.save_articles(first.id, &articles).await.unwrap();
        let updated = repo.save_articles(first.id, &articles).await.unwrap();
        assert!(created[0].created);
        assert!(!updated[0].created);
        assert_eq!(created[0].id, updated[0].id);
        assert_eq!(repo.articles.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn referenced_image_matches_full_stem() {
        let mut store = sql_store();
        store.objects.insert("Lerninhalte/SQL/Bilder/ABB1.2.png".into(), vec![3]);
        store.objects.insert(
            "Lerninhalte/SQL/Artikel/1.2 Joins.docx".into(),
            docx_bytes(&document_xml(&["Titel$ Joins Titel$", "Bild$ ABB1.2.png"])),
        );
        let repo = MemoryRepository::with_module(7, "SQL");
        let url = "https://s3.eu-central-2.wasabisys.com/dsp-e-learning/Lerninhalte/SQL/Artikel/1.2%20Joins.docx";
        let result = ContentOrchestrator::new(&store, &repo).process_article_from_url(7, url).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.images_found, vec!["ABB1.2".to_string()]);
        assert_eq!(result.images_saved, 1);
        let images = repo.images.lock().unwrap();
        assert!(images.contains_key(&(7, "ABB1.2.png".to_string())));
        assert!(!images.contains_key(&(7, "ABB1.1.png".to_string())));
    }
}
