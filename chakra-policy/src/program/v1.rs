//! Revision 1: same checks as revision 0, redeployed under a new content id.

use super::steps;
use super::{PolicyFailure, PolicyParams, PolicyValidator, SandboxRuntime};
use crate::registry::PolicyVersion;
use async_trait::async_trait;

pub struct SiwsPolicyV1;

#[async_trait]
impl PolicyValidator for SiwsPolicyV1 {
    fn version(&self) -> PolicyVersion {
        PolicyVersion::V1
    }

    async fn evaluate(
        &self,
        params: &PolicyParams,
        runtime: &dyn SandboxRuntime,
    ) -> Result<String, PolicyFailure> {
        let object = steps::parse_siws_object(params)?;
        let input = &object.siws_input;
        let now = runtime.now();

        steps::check_statement(input)?;
        steps::check_issued_at(input, now)?;
        steps::check_expiration(input, now)?;
        steps::check_domain(input)?;
        steps::verify_and_release(&object, params, runtime).await
    }
}
