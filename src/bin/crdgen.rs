//! Prints the `EncryptionMigrationController` CRD definition to stdout as
//! JSON (a valid Kubernetes manifest format, avoiding a YAML-only
//! dependency for a one-shot generator).

use encryption_migration_controller::crd::EncryptionMigrationController;
use kube::CustomResourceExt;

fn main() {
    let crd = EncryptionMigrationController::crd();
    println!("{}", serde_json::to_string_pretty(&crd).expect("CRD always serializes"));
}
