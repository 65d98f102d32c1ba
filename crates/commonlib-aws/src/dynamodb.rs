//! DynamoDB item updates, key queries and full-table scans.
//!
//! Items are converted with `serde_dynamo`, so keys, values and records can
//! be any serde type that maps to a DynamoDB item.

use std::collections::HashMap;

use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub use aws_sdk_dynamodb::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

type Item = HashMap<String, AttributeValue>;

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Set every attribute of `values` on the item identified by `key`.
pub async fn update_table_item<K, V>(
    client: &Client,
    table: &str,
    key: &K,
    values: &V,
) -> Result<UpdateItemOutput>
where
    K: Serialize,
    V: Serialize,
{
    let key: Item = serde_dynamo::to_item(key)?;
    let values: Item = serde_dynamo::to_item(values)?;
    let expression = Expression::build(values, "n", "v", ", ");

    client
        .update_item()
        .table_name(table)
        .set_key(Some(key))
        .update_expression(format!("SET {}", expression.text))
        .set_expression_attribute_names(Some(expression.names))
        .set_expression_attribute_values(Some(expression.values))
        .send()
        .await
        .map_err(sdk_error("UpdateItem"))
}

/// Items whose attributes equal every entry of `keys`.
///
/// Only the first page of results is read.
pub async fn query_table<T, K>(client: &Client, table: &str, keys: &K) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    K: Serialize,
{
    let keys: Item = serde_dynamo::to_item(keys)?;
    let expression = Expression::build(keys, "k", "k", " AND ");

    let output = client
        .query()
        .table_name(table)
        .key_condition_expression(expression.text)
        .set_expression_attribute_names(Some(expression.names))
        .set_expression_attribute_values(Some(expression.values))
        .send()
        .await
        .map_err(sdk_error("Query"))?;

    let records: Vec<T> = serde_dynamo::from_items(output.items.unwrap_or_default())?;
    debug!(table, count = records.len(), "loaded records");
    Ok(records)
}

/// Every item of `table`, following scan pagination.
pub async fn read_all_table_data<T>(client: &Client, table: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(sdk_error("Scan"))?;

        items.extend(output.items.unwrap_or_default());
        match output.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    let records: Vec<T> = serde_dynamo::from_items(items)?;
    debug!(table, count = records.len(), "loaded records");
    Ok(records)
}

/// `#n0 = :v0` style comparisons joined by `separator`, in key order so the
/// expression is stable.
#[derive(Debug)]
struct Expression {
    text: String,
    names: HashMap<String, String>,
    values: Item,
}

impl Expression {
    fn build(attributes: Item, name_prefix: &str, value_prefix: &str, separator: &str) -> Self {
        let mut attributes: Vec<_> = attributes.into_iter().collect();
        attributes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut clauses = Vec::with_capacity(attributes.len());
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (i, (attribute, value)) in attributes.into_iter().enumerate() {
            let name = format!("#{name_prefix}{i}");
            let placeholder = format!(":{value_prefix}{i}");
            clauses.push(format!("{name} = {placeholder}"));
            names.insert(name, attribute);
            values.insert(placeholder, value);
        }

        Self {
            text: clauses.join(separator),
            names,
            values,
        }
    }
}
