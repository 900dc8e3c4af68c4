pub mod env {
    pub const REPO_PATH: &str = "TM_REPO_PATH";
    pub const KUBECONFIG_PATH: &str = "TM_KUBECONFIG_PATH";
    pub const SHARED_PATH: &str = "TM_SHARED_PATH";
    pub const EXPORT_PATH: &str = "TM_EXPORT_PATH";
    pub const PHASE: &str = "TM_PHASE";
    pub const GIT_SHA: &str = "TM_GIT_SHA";
    pub const GIT_REF: &str = "TM_GIT_REF";
    pub const LOG_LEVEL: &str = "TM_LOG_LEVEL";
}

pub mod paths {
    pub const REPO: &str = "/src";
    pub const KUBECONFIG: &str = "/tmp/tm/kubeconfig";
    pub const UNTRUSTED_KUBECONFIG: &str = "/tmp/tm/untrusted-kubeconfig";
    pub const SHARED: &str = "/tmp/tm/shared";
    pub const EXPORT: &str = "/tmp/tm/export";
    pub const PREPARE_REPOS: &str = "/tm/repos.json";
}

pub mod artifacts {
    pub const KUBECONFIGS: &str = "kubeconfigs";
    pub const UNTRUSTED_KUBECONFIGS: &str = "untrustedKubeconfigs";
    pub const SHARED_FOLDER: &str = "sharedFolder";
    pub const EXPORT: &str = "ExportArtifact";
    pub const REPO: &str = "repo";
    pub const REPOS: &str = "repos";
}

pub mod phases {
    pub const RUNNING: &str = "Running";
    pub const EXIT: &str = "Exit";
    pub const PARAMETER: &str = "phase";
    pub const PARAMETER_REF: &str = "{{inputs.parameters.phase}}";
}

pub mod annotations {
    pub const TEST_DEFINITION_NAME: &str = "testmachinery.sapcloud.io/TestDefinition";
    pub const TEST_DEFINITION_ID: &str = "testmachinery.sapcloud.io/ID";
}

pub mod conditions {
    pub const SUCCESS: &str = "{{workflow.status}} == Succeeded";
    pub const ERROR: &str = "{{workflow.status}} != Succeeded";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_constants() {
        assert_eq!(artifacts::KUBECONFIGS, "kubeconfigs");
        assert_eq!(artifacts::SHARED_FOLDER, "sharedFolder");
    }

    #[test]
    fn test_phase_parameter_ref_matches_name() {
        assert!(phases::PARAMETER_REF.contains(phases::PARAMETER));
    }
}
