//! Page metadata extraction.
//!
//! The extraction script runs in the page via `Runtime.evaluate`. It works
//! on a clone of the document with scripts, styles, stylesheet links and
//! comments removed, so the live page is never modified.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::protocol::PageMetadata;

use super::page::{CaptureFormat, ChromiumSurface};

// ============================================================================
// Constants
// ============================================================================

/// JPEG quality of the metadata screenshot.
const SCREENSHOT_QUALITY: u8 = 70;

/// Collects interactive elements and a cleaned DOM snapshot.
const EXTRACTION_SCRIPT: &str = r#"(() => {
  const root = document.documentElement.cloneNode(true);

  root.querySelectorAll('script, style, link[rel="stylesheet"]').forEach((el) => el.remove());
  const walker = document.createTreeWalker(root, NodeFilter.SHOW_COMMENT, null);
  const comments = [];
  while (walker.nextNode()) comments.push(walker.currentNode);
  comments.forEach((node) => node.parentNode && node.parentNode.removeChild(node));

  const attributesOf = (el) =>
    Object.fromEntries(Array.from(el.attributes).map((attr) => [attr.name, attr.value]));

  const clickable = Array.from(
    root.querySelectorAll('button, a[href], input[type="submit"], input[type="button"], [onclick]')
  ).map((el) => ({ tagName: el.tagName, attributes: attributesOf(el) }));

  const forms = Array.from(root.querySelectorAll('input, textarea, select, form')).map((el) => ({
    tagName: el.tagName,
    attributes: attributesOf(el),
    type: el.type || null,
    name: el.name || el.getAttribute('name') || null,
    value: el.value || null,
  }));

  return {
    clickableElementsInfo: JSON.stringify(clickable),
    formElementsInfo: JSON.stringify(forms),
    domSnapshot: root.outerHTML,
    totalClickableElementCount: clickable.length,
    totalFormElementCount: forms.length,
  };
})()"#;

// ============================================================================
// ChromiumSurface - Metadata
// ============================================================================

impl ChromiumSurface {
    /// Extracts page metadata, optionally with a JPEG screenshot.
    ///
    /// A failed screenshot only omits `screenshotBase64`. A failed
    /// extraction returns `None`. Both are logged.
    pub(crate) async fn extract_metadata(&self, include_screenshot: bool) -> Option<PageMetadata> {
        let screenshot = if include_screenshot {
            match self
                .screenshot(CaptureFormat::Jpeg(SCREENSHOT_QUALITY), super::cdp::DEFAULT_COMMAND_TIMEOUT)
                .await
            {
                Ok(data) => Some(format!("data:image/jpeg;base64,{data}")),
                Err(e) => {
                    error!(error = %e, "Metadata screenshot failed");
                    None
                }
            }
        } else {
            None
        };

        let evaluated = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": EXTRACTION_SCRIPT,
                    "returnByValue": true,
                    "awaitPromise": true
                })),
            )
            .await;

        match evaluated.and_then(parse_evaluation) {
            Ok(mut metadata) => {
                metadata.screenshot_base64 = screenshot;
                debug!(
                    clickable = metadata.total_clickable_element_count,
                    forms = metadata.total_form_element_count,
                    "Page metadata extracted"
                );
                Some(metadata)
            }
            Err(e) => {
                error!(error = %e, "Page metadata extraction failed");
                None
            }
        }
    }
}

/// Reads [`PageMetadata`] from a `Runtime.evaluate` result.
fn parse_evaluation(result: Value) -> Result<PageMetadata> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("script threw");
        return Err(Error::protocol(format!("extraction script failed: {text}")));
    }

    let value = result
        .pointer("/result/value")
        .cloned()
        .ok_or_else(|| Error::protocol("extraction script returned no value"))?;

    Ok(serde_json::from_value(value)?)
}

// ============================================================================
// Tests
// ============================================================================
