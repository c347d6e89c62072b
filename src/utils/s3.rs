use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;

use crate::config::StorageConfig;

/// S3 client for an S3-compatible provider. Path-style addressing keeps
/// keys with spaces and umlauts under `<endpoint>/<bucket>/`.
pub async fn create_s3_client(config: &StorageConfig) -> S3Client {
    let mut loader = ConfigLoader::default()
        .region(Region::new(config.region.clone()))
        .behavior_version(BehaviorVersion::latest());

    if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id.clone(),
            secret.clone(),
            None,
            None,
            "storage-env",
        ));
    }

    let shared = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&shared)
        .endpoint_url(config.endpoint_url.clone())
        .force_path_style(true)
        .build();

    S3Client::from_conf(s3_config)
}
