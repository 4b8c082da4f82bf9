//! Namespace defaulting for generated resources

use crate::resource::ResourceNode;

/// Built-in kinds that are not namespaced
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CSIDriver",
    "CSINode",
    "CertificateSigningRequest",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CustomResourceDefinition",
    "FlowSchema",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "PriorityLevelConfiguration",
    "RuntimeClass",
    "StorageClass",
    "ValidatingAdmissionPolicy",
    "ValidatingAdmissionPolicyBinding",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

/// Whether resources of this kind live in a namespace
pub fn is_namespaced_kind(kind: &str) -> bool {
    !CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Set `namespace` on every namespaced node that does not declare one
///
/// Nodes that already carry a namespace are left untouched; when a
/// namespace is set it becomes the last key under `metadata`.
pub fn apply_namespace_if_unset(nodes: &mut [ResourceNode], namespace: &str) {
    if namespace.is_empty() {
        return;
    }
    for node in nodes.iter_mut() {
        if node.namespace().is_empty() && is_namespaced_kind(node.kind()) {
            node.set_namespace(namespace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_only_missing_namespaces() {
        let mut nodes = vec![
            ResourceNode::from_yaml("kind: ConfigMap\nmetadata:\n  name: a\n").unwrap(),
            ResourceNode::from_yaml("kind: ConfigMap\nmetadata:\n  name: b\n  namespace: other\n")
                .unwrap(),
            ResourceNode::from_yaml("kind: ClusterRole\nmetadata:\n  name: c\n").unwrap(),
        ];

        apply_namespace_if_unset(&mut nodes, "testns");

        assert_eq!(nodes[0].namespace(), "testns");
        assert_eq!(nodes[1].namespace(), "other");
        assert_eq!(nodes[2].namespace(), "");
    }

    #[test]
    fn test_creates_metadata_when_missing() {
        let mut nodes = vec![ResourceNode::from_yaml("kind: Secret\n").unwrap()];
        apply_namespace_if_unset(&mut nodes, "ns");
        assert_eq!(nodes[0].namespace(), "ns");
    }
}
