//! Compute Engine resource models

use serde::{Deserialize, Serialize};

/// A VM instance as returned by the instances list call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Numeric ID, serialised by the API as a string
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Full or partial URL of the machine type
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Tags,
}

impl Instance {
    pub fn tag_items(&self) -> &[String] {
        &self.tags.items
    }
}

/// Network tags attached to an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub items: Vec<String>,
}

/// A region and its quotas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quotas: Vec<Quota>,
}

/// A single quota of a region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub usage: f64,
    #[serde(default)]
    pub limit: f64,
}

/// One page of the instances list call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceList {
    #[serde(default)]
    pub items: Vec<Instance>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_list_from_api_json() {
        let page: InstanceList = serde_json::from_str(
            r#"{
                "kind": "compute#instanceList",
                "items": [
                    {
                        "id": "4567890123456789012",
                        "name": "web-1",
                        "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-small",
                        "status": "RUNNING",
                        "tags": {"items": ["http-server", "web"], "fingerprint": "abc"}
                    },
                    {"id": "1", "name": "bare"}
                ],
                "nextPageToken": "page-2"
            }"#,
        )
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "4567890123456789012");
        assert!(page.items[0].machine_type.ends_with("/machineTypes/e2-small"));
        assert_eq!(page.items[0].tag_items(), ["http-server", "web"]);
        assert!(page.items[1].tag_items().is_empty());
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn test_empty_instance_list() {
        let page: InstanceList = serde_json::from_str(r#"{"kind": "compute#instanceList"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_region_from_api_json() {
        let region: Region = serde_json::from_str(
            r#"{
                "name": "us-central1",
                "status": "UP",
                "quotas": [
                    {"metric": "CPUS", "limit": 24.0, "usage": 3.0},
                    {"metric": "IN_USE_ADDRESSES", "limit": 8}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(region.quotas.len(), 2);
        assert_eq!(region.quotas[0].metric, "CPUS");
        assert_eq!(region.quotas[0].usage, 3.0);
        assert_eq!(region.quotas[1].limit, 8.0);
        assert_eq!(region.quotas[1].usage, 0.0);
    }
}
