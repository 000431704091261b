//! DynamoDB revocation source.
//!
//! Scans a table through a global secondary index keyed on the `ca`
//! attribute, projecting exactly the six entry attributes, and follows the
//! pagination token until the scan is complete or the deadline elapses.
//! Items missing any projected attribute are skipped silently.

use super::{RevocationSource, SourceError};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Select};
use aws_sdk_dynamodb::Client;
use ocspd_proto::RawEntry;
use std::collections::HashMap;
use std::time::Duration;

const PROJECTED_ATTRIBUTES: &str = "ca,serial,rev_type,exp_date,rev_date,crl_reason";

pub struct DynamoSource {
    client: Client,
    ca: String,
    table_name: String,
    index_name: String,
    timeout_secs: u64,
}

impl DynamoSource {
    pub fn new(
        client: Client,
        ca: impl Into<String>,
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            ca: ca.into(),
            table_name: table_name.into(),
            index_name: index_name.into(),
            timeout_secs,
        }
    }

    async fn scan_all(&self) -> Result<Vec<RawEntry>, SourceError> {
        let mut items: Vec<HashMap<String, AttributeValue>> = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .index_name(&self.index_name)
                .select(Select::SpecificAttributes)
                .projection_expression(PROJECTED_ATTRIBUTES)
                .filter_expression("ca = :ca")
                .expression_attribute_values(":ca", AttributeValue::S(self.ca.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| SourceError::Backend(err.to_string()))?;

            items.extend(output.items().iter().cloned());

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(items.iter().filter_map(unmarshal_item).collect())
    }
}

/// Pulls the six projected string attributes out of one item. `None` when
/// any attribute is missing or not a string.
fn unmarshal_item(item: &HashMap<String, AttributeValue>) -> Option<RawEntry> {
    let attr = |name: &str| -> Option<String> { item.get(name)?.as_s().ok().cloned() };

    Some(RawEntry {
        ca: attr("ca")?,
        serial: attr("serial")?,
        rev_type: attr("rev_type")?,
        exp_date: attr("exp_date")?,
        rev_date: attr("rev_date")?,
        crl_reason: attr("crl_reason")?,
    })
}

#[async_trait]
impl RevocationSource for DynamoSource {
    async fn scan(&self) -> Result<Vec<RawEntry>, SourceError> {
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), self.scan_all()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.timeout_secs)),
        }
    }
}
