//! RBD block image management.
//!
//! Documents follow the manager's `/api/block/image` endpoints; mutations are
//! driven to completion by [`RbdClient`].

mod orchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::{lenient_time, normalize_namespace, optional_string, path_join};

pub use orchestrator::RbdClient;

/// Exception code the manager reports when an image name is taken.
pub const RBD_IMAGE_ALREADY_EXISTS: &str = "17";

/// Location of a volume as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeIdentity {
    pub pool_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub image_name: String,
}

impl VolumeIdentity {
    pub fn new(pool_name: &str, namespace: Option<&str>, image_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            namespace: normalize_namespace(namespace),
            image_name: image_name.to_string(),
        }
    }

    pub fn image_spec(&self) -> String {
        path_join(&self.pool_name, self.namespace.as_deref(), &self.image_name)
    }
}

/// Desired new name and size of an existing volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeUpdate {
    pub new_name: String,
    pub new_size: u64,
}

/// Body of `POST /api/block/image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbdCreate {
    pub features: Option<Vec<String>>,
    pub pool_name: String,
    pub namespace: Option<String>,
    pub name: String,
    pub size: u64,
    pub obj_size: u64,
    pub stripe_unit: Option<u64>,
    pub stripe_count: Option<u64>,
    pub data_pool: Option<String>,
    pub configuration: serde_json::Map<String, Value>,
}

impl RbdCreate {
    pub fn new(identity: &VolumeIdentity, size: u64) -> Self {
        Self {
            features: None,
            pool_name: identity.pool_name.clone(),
            namespace: identity.namespace.clone(),
            name: identity.image_name.clone(),
            size,
            obj_size: 0,
            stripe_unit: None,
            stripe_count: None,
            data_pool: None,
            configuration: serde_json::Map::new(),
        }
    }
}

/// Body of `PUT /api/block/image/{image_spec}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbdUpdate {
    pub features: Option<Vec<String>>,
    pub name: String,
    pub size: u64,
    pub configuration: serde_json::Map<String, Value>,
}

impl RbdUpdate {
    pub fn new(update: &VolumeUpdate) -> Self {
        Self {
            features: None,
            name: update.new_name.clone(),
            size: update.new_size,
            configuration: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbdConfigOption {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub source: i64,
}

/// Image descriptor from `GET /api/block/image/{image_spec}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbdImage {
    pub size: u64,
    pub obj_size: u64,
    pub num_objs: u64,
    pub order: u32,
    pub block_name_prefix: String,
    pub name: String,
    pub unique_id: String,
    pub id: String,
    pub image_format: u32,
    pub pool_name: String,
    #[serde(deserialize_with = "optional_string")]
    pub namespace: Option<String>,
    pub features: u64,
    pub features_name: Vec<String>,
    #[serde(deserialize_with = "lenient_time")]
    pub timestamp: Option<DateTime<Utc>>,
    pub stripe_count: u64,
    pub stripe_unit: u64,
    #[serde(deserialize_with = "optional_string")]
    pub data_pool: Option<String>,
    pub parent: Option<Value>,
    pub snapshots: Vec<Value>,
    pub total_disk_usage: Option<u64>,
    pub disk_usage: Option<u64>,
    pub configuration: Vec<RbdConfigOption>,
}

impl RbdImage {
    pub fn identity(&self) -> VolumeIdentity {
        VolumeIdentity::new(&self.pool_name, self.namespace.as_deref(), &self.name)
    }
}

/// One pool's entry in `GET /api/block/image`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbdPoolListing {
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub value: Vec<RbdImage>,
    #[serde(default)]
    pub pool_name: String,
}
