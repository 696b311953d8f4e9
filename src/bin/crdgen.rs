//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML for every
//! resource the controller serves.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/crds.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use credential_request_controller::crd::{
    AwsAccessKeyRequest, AzureAccessKeyRequest, DatabaseAccessRequest, GcpAccessKeyRequest,
    VaultRole,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

fn main() {
    let crds: [CustomResourceDefinition; 5] = [
        DatabaseAccessRequest::crd(),
        AwsAccessKeyRequest::crd(),
        GcpAccessKeyRequest::crd(),
        AzureAccessKeyRequest::crd(),
        VaultRole::crd(),
    ];

    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("# Change the types under src/crd and regenerate");
    for crd in &crds {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
