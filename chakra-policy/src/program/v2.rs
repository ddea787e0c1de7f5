//! Revision 2: adds the nonce registry lookup ahead of the SIWS checks.
//!
//! The nonce of a decryption proof is the hash of the bearer token the
//! server issued at login, so a proof is only honored while the server still
//! remembers that login for the same address.

use super::steps;
use super::{PolicyFailure, PolicyParams, PolicyValidator, SandboxRuntime};
use crate::registry::PolicyVersion;
use async_trait::async_trait;
use tracing::debug;

pub struct SiwsPolicyV2;

#[async_trait]
impl PolicyValidator for SiwsPolicyV2 {
    fn version(&self) -> PolicyVersion {
        PolicyVersion::V2
    }

    async fn evaluate(
        &self,
        params: &PolicyParams,
        runtime: &dyn SandboxRuntime,
    ) -> Result<String, PolicyFailure> {
        let object = steps::parse_siws_object(params)?;
        let input = &object.siws_input;

        steps::check_nonce(input, runtime).await?;
        debug!("nonce accepted for {}", input.address);

        let now = runtime.now();
        steps::check_statement(input)?;
        steps::check_issued_at(input, now)?;
        steps::check_expiration(input, now)?;
        steps::check_domain(input)?;
        steps::verify_and_release(&object, params, runtime).await
    }
}
