//! Work served to a guest: instructions plus the resources they reference

use std::collections::HashMap;
use vmbuild_commands::BuildInstruction;
use vmbuild_resource::ResolvedResource;

/// Instruction batch and resource table for one build
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
    instructions: Vec<BuildInstruction>,
    resources: HashMap<String, Vec<ResolvedResource>>,
}

impl WorkContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With an instruction appended
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<BuildInstruction>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// With a resource registered under `path`
    #[must_use]
    pub fn with_resource(mut self, path: impl Into<String>, resource: ResolvedResource) -> Self {
        self.add_resource(path, resource);
        self
    }

    /// Append an instruction
    pub fn add_instruction(&mut self, instruction: impl Into<BuildInstruction>) {
        self.instructions.push(instruction.into());
    }

    /// Register a resource under `path`; several resources may share a path
    /// and are streamed in registration order
    pub fn add_resource(&mut self, path: impl Into<String>, resource: ResolvedResource) {
        self.resources.entry(path.into()).or_default().push(resource);
    }

    /// Instructions in serving order
    #[inline]
    #[must_use]
    pub fn instructions(&self) -> &[BuildInstruction] {
        &self.instructions
    }

    /// Resources registered under `path`
    #[must_use]
    pub fn resources_for(&self, path: &str) -> Option<&[ResolvedResource]> {
        self.resources.get(path).map(Vec::as_slice)
    }

    /// Registered request paths
    pub fn resource_paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Serialize every instruction into its wire record
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if an instruction cannot be serialized
    pub fn records(&self) -> Result<Vec<String>, serde_json::Error> {
        self.instructions.iter().map(BuildInstruction::to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vmbuild_commands::{Copy, InstructionDecoder, Run};

    #[test]
    fn records_decode_back_in_order() {
        let context = WorkContext::new()
            .with_instruction(Copy {
                original_command: "COPY etc /etc".to_string(),
                source: "etc".to_string(),
                target: "/etc".to_string(),
                ..Copy::default()
            })
            .with_instruction(Run {
                original_command: "RUN true".to_string(),
                command: "true".to_string(),
                ..Run::default()
            });

        let records = context.records().unwrap();
        let decoded: Vec<_> = InstructionDecoder::default()
            .decode_batch(&records)
            .unwrap()
            .collect();
        assert_eq!(decoded, context.instructions().to_vec());
    }

    #[test]
    fn shared_path_keeps_registration_order() {
        let context = WorkContext::new()
            .with_resource("glob", ResolvedResource::file_from_bytes(&b"1"[..], "a", "/a"))
            .with_resource("glob", ResolvedResource::file_from_bytes(&b"2"[..], "b", "/b"));

        let targets: Vec<_> = context
            .resources_for("glob")
            .unwrap()
            .iter()
            .map(ResolvedResource::target_path)
            .collect();
        assert_eq!(targets, vec!["/a", "/b"]);
        assert!(context.resources_for("other").is_none());
        assert_eq!(context.resource_paths().count(), 1);
    }
}
