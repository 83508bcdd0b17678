//! Rendering and sending the limit warning.
//!
//! The notifier is invoked at most once per section (the tracker's latch
//! guarantees this). A failed send is reported to the caller and never
//! retried.

use crate::config::NotifySettings;
use crate::core::NotifyTrigger;
use crate::provider::{NotifyAction, NotifyError};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::sync::Arc;

/// Sends warnings through a [`NotifyAction`].
#[derive(Clone)]
pub struct Notifier {
    action: Arc<dyn NotifyAction>,
}

impl Notifier {
    pub fn new(action: Arc<dyn NotifyAction>) -> Self {
        Self { action }
    }

    /// Render the warning for `trigger` and hand it to the action.
    ///
    /// Returns the message that was sent.
    pub fn notify(
        &self,
        trigger: &NotifyTrigger,
        settings: &NotifySettings,
    ) -> Result<String, NotifyError> {
        let message = render_message(trigger, settings)?;
        self.action.post(&message, trigger.post_count)?;
        Ok(message)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

/// Format a release instant in the configured zone and format.
pub fn format_release(
    release_at: DateTime<Utc>,
    settings: &NotifySettings,
) -> Result<String, NotifyError> {
    let tz = settings
        .tz()
        .map_err(|e| NotifyError::Format(e.to_string()))?;

    let items = StrftimeItems::new(&settings.release_time_format);
    if items.clone().any(|item| matches!(item, Item::Error)) {
        return Err(NotifyError::Format(format!(
            "invalid release time format {:?}",
            settings.release_time_format
        )));
    }

    let mut out = String::new();
    write!(
        out,
        "{}",
        release_at.with_timezone(&tz).format_with_items(items)
    )
    .map_err(|_| NotifyError::Format("release time could not be rendered".to_string()))?;
    Ok(out)
}

/// Fill the message template for `trigger`.
///
/// `{count}`/`{0}` is the section's post count, `{release}`/`{1}` the release
/// time and `{annotation}`/`{2}` the inaccuracy annotation (empty when the
/// section start is accurate). Unknown placeholders are left as they are.
pub fn render_message(
    trigger: &NotifyTrigger,
    settings: &NotifySettings,
) -> Result<String, NotifyError> {
    let release = format_release(trigger.release_at, settings)?;
    let count = trigger.post_count.to_string();
    let annotation = if trigger.accurate {
        ""
    } else {
        settings.inaccuracy_annotation.as_str()
    };

    Ok(fill_placeholders(&settings.message_template, |name| {
        match name {
            "count" | "0" => Some(count.as_str()),
            "release" | "1" => Some(release.as_str()),
            "annotation" | "2" => Some(annotation),
            _ => None,
        }
    }))
}

/// Single pass over `template`; substituted text is never re-scanned.
fn fill_placeholders<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
