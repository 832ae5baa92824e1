//! Built-in tool catalog
//!
//! - `crud`: generic create/read/update/delete/list handlers over a collection
//! - `catalog`: the eight document apps registered at startup

pub mod catalog;
pub mod crud;

pub use catalog::catalog_apps;
pub use crud::{CollectionSpec, CrudHandler};

use crate::error::Result;
use crate::tool::ToolRegistry;

/// Register every catalog app into `registry`
pub fn register_catalog(registry: &mut ToolRegistry) -> Result<()> {
    for app in catalog_apps() {
        registry.register(app)?;
    }
    Ok(())
}

/// Registry holding only the catalog
pub fn catalog_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_catalog(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_registry_has_forty_tools() {
        let registry = catalog_registry().unwrap();
        assert_eq!(registry.list_apps().len(), 8);
        assert_eq!(registry.len(), 40);
    }
}
