use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lyla_core::KeyValueStore;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::key::{decode_key, encode_key};

/// Records stored as JSON files in a GitHub repository through the
/// contents API, one commit per write.
pub struct GitHubStore {
    client: Client,
    token: String,
    repo: String,
    dir: String,
    branch: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct CommitResult {
    content: CommittedFile,
}

#[derive(Debug, Deserialize)]
struct CommittedFile {
    path: String,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl GitHubStore {
    pub fn new(token: String, repo: String, dir: String, branch: String) -> Self {
        info!("Using GitHub store at {repo}/{dir} ({branch})");
        Self {
            client: Client::new(),
            token,
            repo,
            dir: dir.trim_matches('/').to_string(),
            branch,
            base_url: "https://api.github.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn dir_url(&self) -> String {
        if self.dir.is_empty() {
            format!("{}/repos/{}/contents", self.base_url, self.repo)
        } else {
            format!("{}/repos/{}/contents/{}", self.base_url, self.repo, self.dir)
        }
    }

    fn file_url(&self, key: &str) -> String {
        format!("{}/{}.json", self.dir_url(), encode_key(key))
    }

    fn on_branch(&self, url: String) -> String {
        format!("{url}?ref={}", self.branch)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "lyla")
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<ContentFile>> {
        let response = self
            .authorized(self.client.get(self.on_branch(self.file_url(key))))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("GitHub returned {} fetching {key}", response.status());
        }
        Ok(Some(response.json::<ContentFile>().await?))
    }

    /// Commit `bytes` as a new file at `path` (relative to the repository
    /// root) and return its download URL, or the path when GitHub omits it.
    pub async fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> anyhow::Result<String> {
        let path = path.trim_matches('/');
        let url = format!("{}/repos/{}/contents/{path}", self.base_url, self.repo);

        let response = self
            .authorized(self.client.put(url))
            .json(&json!({
                "message": message,
                "content": STANDARD.encode(bytes),
                "branch": self.branch,
            }))
            .send()
            .await?;

        let status = response.status();
        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub returned {status} uploading {path}: {body}");
        }

        let committed = response.json::<CommitResult>().await?.content;
        info!("Uploaded {} bytes to {}/{}", bytes.len(), self.repo, committed.path);
        Ok(committed.download_url.unwrap_or(committed.path))
    }
}

#[async_trait]
impl KeyValueStore for GitHubStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let Some(file) = self.fetch(key).await? else {
            return Ok(None);
        };

        // The API wraps base64 content at 60 columns.
        let encoded: String = file
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD.decode(encoded)?;
        Ok(Some(String::from_utf8(bytes)?))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let existing = self.fetch(key).await?;

        let mut body = json!({
            "message": format!("Update {key}"),
            "content": STANDARD.encode(value.as_bytes()),
            "branch": self.branch,
        });
        if let Some(file) = existing {
            body["sha"] = json!(file.sha);
        }

        let response = self
            .authorized(self.client.put(self.file_url(key)))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
            anyhow::bail!("GitHub returned {status} saving {key}");
        }

        debug!("Saved {key} to GitHub");
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let Some(file) = self.fetch(key).await? else {
            return Ok(false);
        };

        let response = self
            .authorized(self.client.delete(self.file_url(key)))
            .json(&json!({
                "message": format!("Delete {key}"),
                "sha": file.sha,
                "branch": self.branch,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("GitHub returned {} deleting {key}", response.status());
        }
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let response = self
            .authorized(self.client.get(self.on_branch(self.dir_url())))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            anyhow::bail!("GitHub returned {} listing {}", response.status(), self.dir);
        }

        let entries = response.json::<Vec<DirEntry>>().await?;
        let mut keys: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .filter_map(|e| e.name.strip_suffix(".json").and_then(decode_key))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const FILE_PATH: &str = r"^/repos/owner/data/contents/userdata/chat~2Falice\.json";

    fn store(server: &mockito::ServerGuard) -> GitHubStore {
        GitHubStore::new(
            "gh-token".to_string(),
            "owner/data".to_string(),
            "userdata".to_string(),
            "main".to_string(),
        )
        .with_base_url(server.url())
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(FILE_PATH.to_string()))
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        assert_eq!(store(&server).get("chat/alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_decodes_wrapped_base64() {
        let mut server = mockito::Server::new_async().await;
        let encoded = STANDARD.encode(r#"{"messages":[]}"#);
        let (head, tail) = encoded.split_at(8);
        let _mock = server
            .mock("GET", Matcher::Regex(FILE_PATH.to_string()))
            .match_header("authorization", "Bearer gh-token")
            .with_status(200)
            .with_body(json!({ "sha": "abc", "content": format!("{head}\n{tail}\n") }).to_string())
            .create_async()
            .await;

        assert_eq!(
            store(&server).get("chat/alice").await.unwrap().as_deref(),
            Some(r#"{"messages":[]}"#)
        );
    }

    #[tokio::test]
    async fn put_updates_existing_file_with_sha() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", Matcher::Regex(FILE_PATH.to_string()))
            .with_status(200)
            .with_body(json!({ "sha": "old-sha", "content": "" }).to_string())
            .create_async()
            .await;
        let put = server
            .mock("PUT", Matcher::Regex(FILE_PATH.to_string()))
            .match_body(Matcher::PartialJson(json!({
                "content": STANDARD.encode("payload"),
                "branch": "main",
                "sha": "old-sha",
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        store(&server).put("chat/alice", "payload").await.unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn put_reports_rejected_write() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", Matcher::Regex(FILE_PATH.to_string()))
            .with_status(404)
            .create_async()
            .await;
        let _put = server
            .mock("PUT", Matcher::Regex(FILE_PATH.to_string()))
            .with_status(409)
            .create_async()
            .await;

        let err = store(&server).put("chat/alice", "x").await.unwrap_err();
        assert!(err.to_string().contains("409"));
    }

    #[tokio::test]
    async fn list_decodes_file_names() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                Matcher::Regex(r"^/repos/owner/data/contents/userdata(\?|$)".to_string()),
            )
            .with_status(200)
            .with_body(
                json!([
                    { "name": "chat~2Fbob.json", "type": "file" },
                    { "name": "chat~2Falice.json", "type": "file" },
                    { "name": "images", "type": "dir" },
                    { "name": "README.md", "type": "file" },
                ])
                .to_string(),
            )
            .create_async()
            .await;

        assert_eq!(
            store(&server).list("chat/").await.unwrap(),
            vec!["chat/alice".to_string(), "chat/bob".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_commits_bytes_on_branch() {
        let mut server = mockito::Server::new_async().await;
        let bytes = [0xff_u8, 0xd8, 0xff, 0xe0];
        let upload = server
            .mock("PUT", "/repos/owner/data/contents/images/a_cat_2024-09-01_14-05-09.jpg")
            .match_header("authorization", "Bearer gh-token")
            .match_body(Matcher::PartialJson(json!({
                "message": "Add image a_cat_2024-09-01_14-05-09.jpg",
                "content": STANDARD.encode(bytes),
                "branch": "main",
            })))
            .with_status(201)
            .with_body(
                json!({
                    "content": {
                        "path": "images/a_cat_2024-09-01_14-05-09.jpg",
                        "download_url": "https://raw.example/owner/data/main/images/a_cat_2024-09-01_14-05-09.jpg",
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let location = store(&server)
            .upload_file(
                "images/a_cat_2024-09-01_14-05-09.jpg",
                &bytes,
                "Add image a_cat_2024-09-01_14-05-09.jpg",
            )
            .await
            .unwrap();

        upload.assert_async().await;
        assert_eq!(
            location,
            "https://raw.example/owner/data/main/images/a_cat_2024-09-01_14-05-09.jpg"
        );
    }

    #[tokio::test]
    async fn upload_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _upload = server
            .mock("PUT", "/repos/owner/data/contents/images/x.png")
            .with_status(422)
            .with_body(r#"{"message":"Invalid request"}"#)
            .create_async()
            .await;

        let err = store(&server)
            .upload_file("/images/x.png", b"png", "Add image x.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("Invalid request"));
    }
}
