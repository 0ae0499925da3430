//! Package manifest and archive layout for single-flow deployments.

/// Archive path of the package manifest.
pub const MANIFEST_PATH: &str = "package.xml";

/// Archive path of a flow's metadata file.
pub fn flow_path(flow_name: &str) -> String {
    format!("flows/{flow_name}.flow-meta.xml")
}

/// `package.xml` listing one Flow member at `api_version`.
pub fn package_manifest(flow_name: &str, api_version: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Package xmlns=\"http://soap.sforce.com/2006/04/metadata\">\n\
         <types><members>{flow_name}</members><name>Flow</name></types>\n\
         <version>{api_version}</version>\n\
         </Package>"
    )
}

/// Files that make up the deployment archive, in archive order.
pub fn archive_entries(flow_name: &str, doc: &str, api_version: &str) -> Vec<(String, String)> {
    vec![
        (flow_path(flow_name), doc.to_string()),
        (
            MANIFEST_PATH.to_string(),
            package_manifest(flow_name, api_version),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::validate;

    #[test]
    fn manifest_lists_flow_member_and_version() {
        let manifest = package_manifest("My_Flow", "65.0");
        assert!(manifest.contains("<members>My_Flow</members><name>Flow</name>"));
        assert!(manifest.contains("<version>65.0</version>"));
        assert!(validate(&manifest).is_ok());
    }

    #[test]
    fn archive_puts_flow_first_then_manifest() {
        let entries = archive_entries("My_Flow", "<doc/>", "65.0");
        let paths: Vec<&str> = entries.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, vec!["flows/My_Flow.flow-meta.xml", "package.xml"]);
        assert_eq!(entries[0].1, "<doc/>");
    }
}
