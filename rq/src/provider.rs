//! External provider interfaces
//!
//! The file host and the completion service are plain request/response
//! collaborators. [`Throttled`] routes every call to one of them through a
//! [`Scheduler`], so one scheduler instance guards one provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::scheduler::{Scheduler, TaskError};

/// A file listed by a cloud file host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub key: String,
    pub name: String,
    pub media_type: String,
}

/// Cloud file host: lists files and resolves playable URLs
#[async_trait]
pub trait FileHost: Send + Sync + 'static {
    type Error: fmt::Display + fmt::Debug + Send + 'static;

    async fn list_files(&self) -> Result<Vec<RemoteFile>, Self::Error>;

    /// Resolve a file key to a URL; `None` if the host has no URL for it
    async fn resolve_url(&self, key: &str) -> Result<Option<String>, Self::Error>;
}

/// AI completion service: prompt in, parsed JSON out
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    type Error: fmt::Display + fmt::Debug + Send + 'static;

    /// `None` when the reply could not be parsed as JSON
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<Option<Value>, Self::Error>;
}

/// A provider whose calls all go through one scheduler
pub struct Throttled<P> {
    provider: Arc<P>,
    scheduler: Scheduler,
}

impl<P> Clone for Throttled<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<P> Throttled<P> {
    pub fn new(provider: P, scheduler: Scheduler) -> Self {
        Self {
            provider: Arc::new(provider),
            scheduler,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<P: FileHost> Throttled<P> {
    pub async fn list_files(&self) -> Result<Vec<RemoteFile>, TaskError<P::Error>> {
        debug!("Throttled::list_files: called");
        let provider = self.provider.clone();
        self.scheduler
            .submit(move || {
                let provider = provider.clone();
                async move { provider.list_files().await }
            })
            .await
    }

    pub async fn resolve_url(&self, key: &str) -> Result<Option<String>, TaskError<P::Error>> {
        debug!(%key, "Throttled::resolve_url: called");
        let provider = self.provider.clone();
        let key = key.to_string();
        self.scheduler
            .submit(move || {
                let provider = provider.clone();
                let key = key.clone();
                async move { provider.resolve_url(&key).await }
            })
            .await
    }
}

impl<P: CompletionProvider> Throttled<P> {
    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Option<Value>, TaskError<P::Error>> {
        debug!(prompt_len = prompt.len(), "Throttled::complete: called");
        let provider = self.provider.clone();
        let prompt = prompt.to_string();
        let system_prompt = system_prompt.map(str::to_string);
        self.scheduler
            .submit(move || {
                let provider = provider.clone();
                let prompt = prompt.clone();
                let system_prompt = system_prompt.clone();
                async move { provider.complete(&prompt, system_prompt.as_deref()).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// File host that throttles the first `throttle` calls
    struct FlakyHost {
        throttle: u32,
        calls: AtomicU32,
        urls: HashMap<String, String>,
    }

    impl FlakyHost {
        fn new(throttle: u32) -> Self {
            let mut urls = HashMap::new();
            urls.insert("song-1".to_string(), "https://files.example/song-1.mp3".to_string());
            Self {
                throttle,
                calls: AtomicU32::new(0),
                urls,
            }
        }

        fn check(&self) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.throttle {
                Err("429 too many requests".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl FileHost for FlakyHost {
        type Error = String;

        async fn list_files(&self) -> Result<Vec<RemoteFile>, String> {
            self.check()?;
            Ok(vec![RemoteFile {
                key: "song-1".to_string(),
                name: "Song One.mp3".to_string(),
                media_type: "audio/mpeg".to_string(),
            }])
        }

        async fn resolve_url(&self, key: &str) -> Result<Option<String>, String> {
            self.check()?;
            Ok(self.urls.get(key).cloned())
        }
    }

    struct EchoCompletion {
        prompts: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl CompletionProvider for EchoCompletion {
        type Error = String;

        async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<Option<Value>, String> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), system_prompt.map(str::to_string)));
            Ok(Some(serde_json::json!({ "year": 1969 })))
        }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            min_dispatch_delay_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_files_retries_throttling() {
        let host = Throttled::new(FlakyHost::new(2), Scheduler::spawn(fast_config()).unwrap());

        let files = host.list_files().await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].media_type, "audio/mpeg");
        assert_eq!(host.provider().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_url() {
        let host = Throttled::new(FlakyHost::new(0), Scheduler::spawn(fast_config()).unwrap());

        let url = host.resolve_url("song-1").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://files.example/song-1.mp3"));

        let missing = host.resolve_url("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_host_exhausts() {
        let host = Throttled::new(FlakyHost::new(u32::MAX), Scheduler::spawn(fast_config()).unwrap());

        let err = host.resolve_url("song-1").await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 4);
        assert_eq!(err.error().map(String::as_str), Some("429 too many requests"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_passes_prompts() {
        let ai = Throttled::new(
            EchoCompletion {
                prompts: Mutex::new(Vec::new()),
            },
            Scheduler::spawn(fast_config()).unwrap(),
        );

        let reply = ai.complete("When was this recorded?", Some("Answer in JSON")).await.unwrap();
        assert_eq!(reply, Some(serde_json::json!({ "year": 1969 })));

        let prompts = ai.provider().prompts.lock().unwrap();
        assert_eq!(
            prompts.as_slice(),
            &[("When was this recorded?".to_string(), Some("Answer in JSON".to_string()))]
        );
    }

    #[test]
    fn test_remote_file_wire_format() {
        let file: RemoteFile =
            serde_json::from_str(r#"{"key":"k1","name":"Intro.flac","mediaType":"audio/flac"}"#).unwrap();
        assert_eq!(file.media_type, "audio/flac");
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["mediaType"], "audio/flac");
    }
}
