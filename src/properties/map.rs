//! Property storage for rules and rule references

use super::{DescriptorRef, PropertyDescriptor, PropertyError, PropertyType, PropertyValue};
use std::collections::HashMap;

/// Declared descriptors plus explicitly set values, keyed by descriptor name.
///
/// Descriptors keep declaration order; a value can only be stored under a
/// descriptor declared here.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    descriptors: Vec<DescriptorRef>,
    values: HashMap<String, PropertyValue>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, descriptor: DescriptorRef) -> Result<(), PropertyError> {
        if self.has_descriptor(descriptor.name()) {
            return Err(PropertyError::Duplicate(descriptor.name().to_string()));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[DescriptorRef] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&DescriptorRef> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    pub fn has_descriptor(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    /// Store a value for a declared descriptor
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let descriptor = self.descriptor(name).ok_or_else(|| PropertyError::Undeclared {
            rule: String::new(),
            property: name.to_string(),
        })?;
        if !descriptor.accepts(&value) {
            return Err(PropertyError::TypeMismatch(name.to_string()));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Explicitly set value, without falling back to the default
    pub fn explicit_value(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Effective value: the explicit value, else the descriptor default
    pub fn value(&self, name: &str) -> Option<PropertyValue> {
        match self.values.get(name) {
            Some(value) => Some(value.clone()),
            None => self.descriptor(name).map(|d| d.default_value()),
        }
    }

    /// Descriptors that have an explicit value, in declaration order
    pub fn set_descriptors(&self) -> impl Iterator<Item = &DescriptorRef> {
        self.descriptors.iter().filter(|d| self.values.contains_key(d.name()))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// An entity owning typed properties
pub trait PropertySource {
    /// Name used in error messages
    fn source_name(&self) -> &str;

    /// All descriptors visible on this source
    fn property_descriptors(&self) -> Vec<DescriptorRef>;

    fn property_descriptor(&self, name: &str) -> Option<DescriptorRef> {
        self.property_descriptors()
            .into_iter()
            .find(|d| d.name() == name)
    }

    /// Effective value of a property, or `None` if it is not declared
    fn property_value(&self, name: &str) -> Option<PropertyValue>;

    /// Whether the property has a value set on this source or below it
    fn is_property_set(&self, name: &str) -> bool;

    fn set_property_value(&mut self, name: &str, value: PropertyValue)
        -> Result<(), PropertyError>;

    fn define_property(&mut self, descriptor: DescriptorRef) -> Result<(), PropertyError>;

    /// Typed read; undeclared descriptors read as their default
    fn get_property<T: PropertyType>(&self, descriptor: &PropertyDescriptor<T>) -> T
    where
        Self: Sized,
    {
        read_typed(self.property_value(descriptor.name()), descriptor)
    }

    fn set_property<T: PropertyType>(
        &mut self,
        descriptor: &PropertyDescriptor<T>,
        value: T,
    ) -> Result<(), PropertyError>
    where
        Self: Sized,
    {
        self.set_property_value(descriptor.name(), PropertyValue::new(value))
    }
}

pub(crate) fn read_typed<T: PropertyType>(
    value: Option<PropertyValue>,
    descriptor: &PropertyDescriptor<T>,
) -> T {
    value
        .and_then(|v| v.downcast_ref::<T>().cloned())
        .unwrap_or_else(|| descriptor.default_value().clone())
}

/// Attach the source name to an undeclared-property error
pub(crate) fn undeclared(source: &str, property: &str) -> PropertyError {
    PropertyError::Undeclared {
        rule: source.to_string(),
        property: property.to_string(),
    }
}
