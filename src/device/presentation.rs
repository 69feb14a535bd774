//! Human-facing views of an adapter

use super::DeviceAdapter;
use crate::client::RefId;
use crate::error::Result;
use std::fmt;

impl fmt::Display for DeviceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Ref: {}) {}", self.ref_id, self.name)
    }
}

impl DeviceAdapter {
    /// `[location] [location2] name`
    pub async fn full_name(&self) -> Result<String> {
        Ok(format!(
            "[{}] [{}] {}",
            self.location().await?,
            self.location2().await?,
            self.name
        ))
    }

    /// `(Ref: N) name (display string)`
    pub async fn describe(&mut self) -> Result<String> {
        let display = self.display_string().await?;
        Ok(format!("{self} ({display})"))
    }

    /// Link to the device's configuration page.
    ///
    /// The tooltip lists the full name and every extra-data pair. A set
    /// error is shown as a marker in front of the label.
    pub async fn device_link(&self, show_id: bool) -> Result<String> {
        let mut title = format!("{}\n", self.full_name().await?);
        if let Some(record) = &self.record {
            for (key, value) in self.registry.extra_data(record).await? {
                let text = match value {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                title.push_str(&format!("{key}: {text}\n"));
            }
        }

        let label = if show_id {
            self.ref_id.to_string()
        } else {
            self.name.clone()
        };
        let marker = if self.error.is_empty() {
            String::new()
        } else {
            error_marker(&self.error)
        };

        Ok(link(self.ref_id, &title, &marker, &label))
    }
}

fn error_marker(error: &str) -> String {
    format!(
        "<span class='device_error' title='{}'>&#9888;</span>",
        escape_html(error)
    )
}

/// `marker` is inserted as-is, `title` and `label` are escaped
pub fn link(ref_id: RefId, title: &str, marker: &str, label: &str) -> String {
    format!(
        "<a target='_self' class='device_management_name' title='{}' href='deviceutility?ref={}&edit=1'>{}{}</a>",
        escape_html(title),
        ref_id,
        marker,
        escape_html(label)
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StoredDevice;
    use crate::config::SyncConfig;
    use crate::mock::MockRegistry;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn porch_light() -> StoredDevice {
        let mut device = StoredDevice {
            location: "Outside".to_string(),
            location2: "Porch".to_string(),
            ..StoredDevice::named("Light <A>")
        };
        device
            .extra_data
            .insert("zone".to_string(), serde_json::json!("front"));
        device
            .extra_data
            .insert("watts".to_string(), serde_json::json!(40));
        device
    }

    async fn adapter() -> DeviceAdapter {
        let mock = Arc::new(MockRegistry::with_device(12, porch_light()));
        DeviceAdapter::load(mock, 12, &SyncConfig::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[tokio::test]
    async fn test_names() {
        let mut device = adapter().await;

        assert_eq!(device.to_string(), "(Ref: 12) Light <A>");
        assert_eq!(
            device.full_name().await.unwrap(),
            "[Outside] [Porch] Light <A>"
        );
        assert_eq!(device.describe().await.unwrap(), "(Ref: 12) Light <A> (-1)");
    }

    #[tokio::test]
    async fn test_device_link() {
        let device = adapter().await;

        assert_eq!(
            device.device_link(false).await.unwrap(),
            "<a target='_self' class='device_management_name' \
             title='[Outside] [Porch] Light &lt;A&gt;\nwatts: 40\nzone: front\n' \
             href='deviceutility?ref=12&edit=1'>Light &lt;A&gt;</a>"
        );
    }

    #[tokio::test]
    async fn test_device_link_with_error() {
        let mut device = adapter().await;
        device.set_error("No reply").await.unwrap();

        let link = device.device_link(true).await.unwrap();

        assert!(link.contains("<span class='device_error' title='No reply'>&#9888;</span>12</a>"));
    }
}
