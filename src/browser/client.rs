// SPDX-License-Identifier: MIT
// The narrow browser-automation capability the workflow consumes.

use async_trait::async_trait;

/// Opaque handle to a DOM element held by the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(pub String);

/// Errors surfaced by a [`WebClient`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP round trip to the driver failed.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// The driver answered with a protocol-level error.
    #[error("webdriver {error}: {message}")]
    WebDriver { error: String, message: String },
}

/// Browser-automation operations the workflow needs.
///
/// Kept deliberately narrow so tests can substitute a canned implementation
/// for the real wire client.
#[async_trait]
pub trait WebClient: Send + Sync {
    /// Load `url` in the current window.
    async fn navigate(&self, url: &str) -> Result<(), ClientError>;

    /// First element matching a CSS selector, or `None` when nothing matches
    /// within the session's implicit wait.
    async fn find_first(&self, selector: &str) -> Result<Option<Element>, ClientError>;

    /// Every element matching a CSS selector, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, ClientError>;

    /// Descendant elements of `element` with the given tag name.
    async fn find_children(&self, element: &Element, tag: &str)
        -> Result<Vec<Element>, ClientError>;

    /// Rendered text of an element.
    async fn text(&self, element: &Element) -> Result<String, ClientError>;

    /// Attribute value, or `None` when the attribute is absent.
    async fn attribute(&self, element: &Element, name: &str)
        -> Result<Option<String>, ClientError>;
}
