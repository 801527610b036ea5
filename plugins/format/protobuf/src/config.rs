use std::path::PathBuf;

use serde::Deserialize;

use recscope_api::TopicMatcher;

/// Which message type a topic's keys and values are encoded with.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicMapping {
    /// Literal name or `/regex/` pattern.
    pub topic_name: TopicMatcher,
    #[serde(default)]
    pub key_proto_type: Option<String>,
    #[serde(default)]
    pub value_proto_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    pub enabled: bool,
    /// Directories searched recursively for `.proto` files. Each directory is
    /// also the import root for the files below it.
    pub paths: Vec<PathBuf>,
    /// Interval for recompiling every descriptor source, including
    /// descriptor sets and registry subjects. Zero disables the background
    /// refresh.
    pub refresh_interval_secs: u64,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: Vec::new(),
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtobufRegistrySource {
    /// Compile every protobuf subject of the schema registry into the
    /// topic-mapped descriptor pool.
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtobufConfig {
    pub enabled: bool,
    pub mappings: Vec<TopicMapping>,
    pub file_system: FileSystemConfig,
    /// Compiled `FileDescriptorSet` files (`protoc --descriptor_set_out`).
    pub descriptor_sets: Vec<PathBuf>,
    /// Extra import roots for `.proto` compilation.
    pub import_paths: Vec<PathBuf>,
    pub schema_registry: ProtobufRegistrySource,
}

impl ProtobufConfig {
    /// True when at least one descriptor source is configured.
    pub fn has_sources(&self) -> bool {
        self.file_system.enabled || !self.descriptor_sets.is_empty() || self.schema_registry.enabled
    }
}
