//! Finds the geoip artifact link on the package registry.
//!
//! The registry is a JavaScript-rendered GitLab package page, so the walk
//! happens inside a live browser session: open the package list, follow the
//! first package entry, then scan the download rows for the one whose label
//! is a geoip jar.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::browser::{Element, WebClient};
use crate::error::UpdateError;

/// First package entry on the registry listing page.
const PACKAGE_ENTRY_SELECTOR: &str = "a.gl-text-body.gl-min-w-0";
/// Download rows on the package detail page.
const DOWNLOAD_TARGET_SELECTOR: &str = "[href*='/-/package_files/']";
/// Tag holding the visible filename inside a download row.
const FILENAME_CHILD_TAG: &str = "span";

/// A label is a geoip artifact only when the whole text matches; names that
/// merely embed the pattern (checksums, signatures) are not artifacts.
pub static ARTIFACT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^geoip-\w{16}\.jar$").expect("artifact name regex"));

/// The artifact the locator resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLink {
    pub filename: String,
    pub url: String,
}

/// Walk the registry and resolve the artifact download link.
///
/// Follows the first (newest) package entry only. Among the download rows the
/// first whose label fully matches `name_pattern` wins.
pub async fn locate(
    client: &dyn WebClient,
    registry_url: &str,
    name_pattern: &Regex,
) -> Result<ArtifactLink, UpdateError> {
    println!(">> Open site...");
    navigate_echo(client, registry_url).await?;

    let entry = client
        .find_first(PACKAGE_ENTRY_SELECTOR)
        .await?
        .ok_or_else(|| UpdateError::LinkNotFound {
            url: registry_url.to_string(),
        })?;
    let package_url = client
        .attribute(&entry, "href")
        .await?
        .ok_or_else(|| UpdateError::LinkNotFound {
            url: registry_url.to_string(),
        })?;

    navigate_echo(client, &package_url).await?;

    let candidates = client.find_all(DOWNLOAD_TARGET_SELECTOR).await?;
    debug!(count = candidates.len(), "download rows on package page");

    for candidate in &candidates {
        if let Some(filename) = artifact_label(client, candidate, name_pattern).await? {
            println!("{filename}");
            if let Some(url) = client.attribute(candidate, "href").await? {
                return Ok(ArtifactLink { filename, url });
            }
        }
    }

    Err(UpdateError::LinkNotFound { url: package_url })
}

/// The row's label text, when it names an artifact.
async fn artifact_label(
    client: &dyn WebClient,
    row: &Element,
    name_pattern: &Regex,
) -> Result<Option<String>, UpdateError> {
    for span in client.find_children(row, FILENAME_CHILD_TAG).await? {
        let text = client.text(&span).await?;
        if name_pattern.is_match(&text) {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

async fn navigate_echo(client: &dyn WebClient, url: &str) -> Result<(), UpdateError> {
    println!("{url}");
    client.navigate(url).await?;
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ClientError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned DOM: selector lookups return fixed element ids, children and
    /// text are keyed per element. Navigations are recorded for assertions.
    #[derive(Default)]
    struct StubClient {
        visited: Mutex<Vec<String>>,
        first: HashMap<&'static str, &'static str>,
        all: HashMap<&'static str, Vec<&'static str>>,
        children: HashMap<&'static str, Vec<&'static str>>,
        texts: HashMap<&'static str, &'static str>,
        attrs: HashMap<(&'static str, &'static str), &'static str>,
    }

    #[async_trait]
    impl WebClient for StubClient {
        async fn navigate(&self, url: &str) -> Result<(), ClientError> {
            self.visited.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn find_first(&self, selector: &str) -> Result<Option<Element>, ClientError> {
            Ok(self.first.get(selector).map(|id| Element(id.to_string())))
        }

        async fn find_all(&self, selector: &str) -> Result<Vec<Element>, ClientError> {
            Ok(self
                .all
                .get(selector)
                .map(|ids| ids.iter().map(|id| Element(id.to_string())).collect())
                .unwrap_or_default())
        }

        async fn find_children(
            &self,
            element: &Element,
            tag: &str,
        ) -> Result<Vec<Element>, ClientError> {
            assert_eq!(tag, "span");
            Ok(self
                .children
                .get(element.0.as_str())
                .map(|ids| ids.iter().map(|id| Element(id.to_string())).collect())
                .unwrap_or_default())
        }

        async fn text(&self, element: &Element) -> Result<String, ClientError> {
            Ok(self
                .texts
                .get(element.0.as_str())
                .unwrap_or(&"")
                .to_string())
        }

        async fn attribute(
            &self,
            element: &Element,
            name: &str,
        ) -> Result<Option<String>, ClientError> {
            assert_eq!(name, "href");
            Ok(self
                .attrs
                .get(&(element.0.as_str(), "href"))
                .map(|v| v.to_string()))
        }
    }

    /// A registry with one package holding a checksum row, the artifact row,
    /// and a row with no matching label at all.
    fn populated_stub() -> StubClient {
        let mut stub = StubClient::default();
        stub.first.insert(PACKAGE_ENTRY_SELECTOR, "pkg-entry");
        stub.attrs
            .insert(("pkg-entry", "href"), "https://registry.example/package/42");
        stub.all.insert(
            DOWNLOAD_TARGET_SELECTOR,
            vec!["row-sha", "row-jar", "row-sig"],
        );
        stub.children.insert("row-sha", vec!["span-sha"]);
        stub.children.insert("row-jar", vec!["span-jar"]);
        stub.children.insert("row-sig", vec!["span-sig"]);
        // Embeds the pattern but is not a full match.
        stub.texts
            .insert("span-sha", "geoip-0123456789abcdef.jar.sha256sum");
        stub.texts.insert("span-jar", "geoip-0123456789abcdef.jar");
        stub.texts.insert("span-sig", "release-notes.txt");
        stub.attrs.insert(
            ("row-sha", "href"),
            "https://registry.example/-/package_files/1/download",
        );
        stub.attrs.insert(
            ("row-jar", "href"),
            "https://registry.example/-/package_files/2/download",
        );
        stub
    }

    #[tokio::test]
    async fn test_locate_picks_first_full_match() {
        let stub = populated_stub();
        let link = locate(&stub, "https://registry.example/packages", &ARTIFACT_NAME_RE)
            .await
            .unwrap();

        assert_eq!(link.filename, "geoip-0123456789abcdef.jar");
        assert_eq!(link.url, "https://registry.example/-/package_files/2/download");
    }

    #[tokio::test]
    async fn test_locate_visits_listing_then_package() {
        let stub = populated_stub();
        locate(&stub, "https://registry.example/packages", &ARTIFACT_NAME_RE)
            .await
            .unwrap();

        assert_eq!(
            *stub.visited.lock().unwrap(),
            vec![
                "https://registry.example/packages".to_string(),
                "https://registry.example/package/42".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_locate_fails_without_package_entry() {
        let stub = StubClient::default();
        let err = locate(&stub, "https://registry.example/packages", &ARTIFACT_NAME_RE)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UpdateError::LinkNotFound { url } if url == "https://registry.example/packages"
        ));
    }

    #[tokio::test]
    async fn test_locate_fails_when_no_label_matches() {
        let mut stub = populated_stub();
        // Artifact row renamed: only near-miss labels remain.
        stub.texts.insert("span-jar", "geoip-0123456789abcdef.zip");
        let err = locate(&stub, "https://registry.example/packages", &ARTIFACT_NAME_RE)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UpdateError::LinkNotFound { url } if url == "https://registry.example/package/42"
        ));
    }

    #[test]
    fn test_artifact_name_anchoring() {
        assert!(ARTIFACT_NAME_RE.is_match("geoip-0123456789abcdef.jar"));
        assert!(ARTIFACT_NAME_RE.is_match("geoip-a1b2c3d4e5f6a7b8.jar"));
        assert!(!ARTIFACT_NAME_RE.is_match("geoip-0123456789abcdef.jar.sha256sum"));
        assert!(!ARTIFACT_NAME_RE.is_match("old-geoip-0123456789abcdef.jar"));
        assert!(!ARTIFACT_NAME_RE.is_match("geoip-0123456789abcde.jar"));
        assert!(!ARTIFACT_NAME_RE.is_match("geoip-0123456789abcdeff.jar"));
    }
}
