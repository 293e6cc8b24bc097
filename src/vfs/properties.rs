use tracing::debug;

use super::{ResourceManager, check_duplicate_properties};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::security::LockCheck;
use crate::types::{PermissionSet, Property, Resource, ResourceFilter};

impl ResourceManager {
    pub fn write_property(&self, ctx: &RequestContext, path: &str, property: Property) -> Result<()> {
        self.write_properties(ctx, path, &[property])
    }

    /// Writes a batch of properties. A batch naming a property twice is rejected before any write.
    pub fn write_properties(
        &self,
        ctx: &RequestContext,
        path: &str,
        properties: &[Property],
    ) -> Result<()> {
        check_duplicate_properties(properties)?;
        let resource = self.resolve(ctx, path, ResourceFilter::IGNORE_EXPIRATION)?;
        self.security.check_permissions(
            ctx,
            &resource,
            PermissionSet::WRITE,
            LockCheck::Required,
            ResourceFilter::IGNORE_EXPIRATION,
        )?;

        self.apply_properties(ctx, &resource, properties)?;
        self.touch_structure(ctx, &resource)?;

        self.cache.clear_resource_caches();
        for property in properties {
            self.events.emit(RepositoryEvent::PropertyModified {
                root_path: resource.root_path.clone(),
                name: property.name.clone(),
            });
        }
        Ok(())
    }

    /// Registers a property name. Writing an unregistered property registers it implicitly.
    pub fn create_property_definition(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        if ctx.is_online() {
            return Err(Error::PermissionDenied {
                path: format!("property definition '{name}'"),
                required: PermissionSet::WRITE,
            });
        }
        validate_property_name(name)?;
        self.store.create_property_definition(name)
    }

    pub fn read_property_definitions(&self) -> Result<Vec<String>> {
        self.store.read_property_definitions()
    }

    pub(super) fn apply_properties(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        properties: &[Property],
    ) -> Result<()> {
        let ws = ctx.workspace();
        for property in properties {
            validate_property_name(&property.name)?;
            if property.value.is_some() && !self.store.has_property_definition(&property.name)? {
                match self.store.create_property_definition(&property.name) {
                    Ok(()) | Err(Error::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
                debug!(name = %property.name, "created property definition");
            }
            self.store.write_property(
                ws,
                &resource.structure_id,
                &property.name,
                property.value.as_deref(),
            )?;
        }
        Ok(())
    }
}

fn validate_property_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
        return Err(Error::invalid(format!("invalid property name '{name}'")));
    }
    Ok(())
}
