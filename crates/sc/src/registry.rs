use sc_provisioner::{Registry, RegistryBuilder};
use std::sync::Arc;

/// Registry with the built-ins and every provider package
pub fn build() -> Arc<Registry> {
    let mut builder = RegistryBuilder::new();
    sc_cloud_gcp::register(&mut builder);
    sc_cloud_aws::register(&mut builder);
    sc_cloud_yandex::register(&mut builder);
    sc_cloud_cloudflare::register(&mut builder);
    sc_cloud_mongodb::register(&mut builder);
    Arc::new(builder.build())
}
