use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::naming::ArtifactLayout;
use crate::workflow::Workflow;

/// Startup preparation: artifact directories, the default voice sample and
/// a probe of the external tools.
pub struct SetupManager {
    client: Client,
}

impl SetupManager {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("subdub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Prepare everything the steps expect to find. Missing tools are only
    /// reported; each step fails on its own if its tool is still absent.
    pub async fn initialize(&self, workflow: &Workflow) -> Result<()> {
        info!("Initializing subdub...");
        let config = workflow.config();

        self.ensure_directories(config).await?;
        if let Err(e) = self.ensure_default_voice_sample(config).await {
            warn!("Default voice sample unavailable: {}", e);
        }

        if workflow.check_tools().await {
            info!("All external tools are available");
        } else {
            warn!("Some external tools are unavailable; the affected steps will fail");
        }

        info!("Initialization completed");
        Ok(())
    }

    pub async fn ensure_directories(&self, config: &Config) -> Result<()> {
        let layout = ArtifactLayout::new(&config.storage);
        async_fs::create_dir_all(layout.uploads_dir()).await?;
        async_fs::create_dir_all(layout.outputs_dir()).await?;
        info!(
            "Artifact directories ready: {}, {}",
            layout.uploads_dir().display(),
            layout.outputs_dir().display()
        );
        Ok(())
    }

    /// Fetch the fallback voice sample when it is missing and a URL is configured.
    pub async fn ensure_default_voice_sample(&self, config: &Config) -> Result<()> {
        let local_path = Path::new(&config.synthesizer.default_voice_sample);
        if async_fs::try_exists(local_path).await? {
            info!("Default voice sample present at {}", local_path.display());
            return Ok(());
        }

        match &config.synthesizer.default_voice_sample_url {
            Some(url) => self.download(url, local_path).await,
            None => {
                warn!(
                    "Default voice sample {} is missing and no download URL is configured",
                    local_path.display()
                );
                Ok(())
            }
        }
    }

    pub async fn download(&self, url: &str, local_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, local_path.display());

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::Config(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        if let Some(parent) = local_path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let temp_path = local_path.with_extension("tmp");
        let mut file = async_fs::File::create(&temp_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);

        async_fs::rename(&temp_path, local_path).await?;
        pb.finish_with_message("done");
        info!("Downloaded {}", local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.public_dir = temp.path().join("public").to_string_lossy().into_owned();
        config.synthesizer.default_voice_sample =
            temp.path().join("assets/voice_01.wav").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_directories_created() {
        let temp = TempDir::new().unwrap();
        let setup = SetupManager::new().unwrap();
        setup.ensure_directories(&config(&temp)).await.unwrap();

        assert!(temp.path().join("public/uploads").is_dir());
        assert!(temp.path().join("public/outputs").is_dir());
    }

    #[tokio::test]
    async fn test_present_voice_sample_is_kept() {
        let temp = TempDir::new().unwrap();
        temp.child("assets/voice_01.wav").write_str("voice").unwrap();

        let mut config = config(&temp);
        // never contacted because the file already exists
        config.synthesizer.default_voice_sample_url = Some("http://127.0.0.1:9/voice.wav".to_string());

        let setup = SetupManager::new().unwrap();
        setup.ensure_default_voice_sample(&config).await.unwrap();
        let kept = std::fs::read_to_string(temp.path().join("assets/voice_01.wav")).unwrap();
        assert_eq!(kept, "voice");
    }

    #[tokio::test]
    async fn test_missing_voice_sample_without_url() {
        let temp = TempDir::new().unwrap();
        let setup = SetupManager::new().unwrap();
        setup.ensure_default_voice_sample(&config(&temp)).await.unwrap();
        assert!(!temp.path().join("assets/voice_01.wav").exists());
    }
}
