//! Argument mappers deriving scope references from their records.

use std::sync::Arc;

use convoy_core::dynamic::{ArgMapper, ArgRequest, ArgValue, CallArgs};

use crate::{BasisRecord, ProjectRecord, TargetRecord};

/// Maps a basis record already present in the args to its reference.
pub struct BasisRefMapper;

impl ArgMapper for BasisRefMapper {
    fn provides(&self) -> ArgRequest {
        ArgRequest::typed::<crate::BasisRef>()
    }

    fn map(&self, args: &CallArgs) -> Option<ArgValue> {
        let record = args.get_typed::<BasisRecord>()?;
        Some(Arc::new(record.to_ref()))
    }
}

/// Maps a project record already present in the args to its reference.
pub struct ProjectRefMapper;

impl ArgMapper for ProjectRefMapper {
    fn provides(&self) -> ArgRequest {
        ArgRequest::typed::<crate::ProjectRef>()
    }

    fn map(&self, args: &CallArgs) -> Option<ArgValue> {
        let record = args.get_typed::<ProjectRecord>()?;
        Some(Arc::new(record.to_ref()))
    }
}

/// Maps a target record already present in the args to its reference.
pub struct TargetRefMapper;

impl ArgMapper for TargetRefMapper {
    fn provides(&self) -> ArgRequest {
        ArgRequest::typed::<crate::TargetRef>()
    }

    fn map(&self, args: &CallArgs) -> Option<ArgValue> {
        let record = args.get_typed::<TargetRecord>()?;
        Some(Arc::new(record.to_ref()))
    }
}

/// The record-to-reference mapper set seeded into scopes that configure no
/// mappers of their own.
pub fn ref_mappers() -> Vec<Arc<dyn ArgMapper>> {
    vec![
        Arc::new(BasisRefMapper),
        Arc::new(ProjectRefMapper),
        Arc::new(TargetRefMapper),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BasisRef;

    #[test]
    fn test_basis_ref_derived_from_record() {
        let mut record = BasisRecord::new("dev", "/tmp/dev");
        record.resource_id = "rid-1".to_string();
        let args = CallArgs::new().typed(record);

        let value = BasisRefMapper.map(&args).expect("mapped");
        let r = value.downcast::<BasisRef>().expect("ref type");
        assert_eq!(r.resource_id, "rid-1");
        assert_eq!(r.name, "dev");
    }

    #[test]
    fn test_ref_mappers_cover_every_record_type() {
        assert_eq!(ref_mappers().len(), 3);
    }
}
