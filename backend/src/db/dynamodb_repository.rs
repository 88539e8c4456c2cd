use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use shared::{AnalysisResult, ClassPrediction, ScanRecord, TumorLevel};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{MetadataStore, NewScan, RepositoryError, new_record};

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    scans_table: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, scans_table: String) -> Self {
        Self {
            client,
            scans_table,
        }
    }

    pub async fn create_scan(&self, record: &ScanRecord) -> Result<(), RepositoryError> {
        let item = scan_to_item(record)?;

        match self
            .client
            .put_item()
            .table_name(&self.scans_table)
            .set_item(Some(item))
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Saved scan {} for user {}", record.id, record.user_id);
                Ok(())
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for scan {}: {:?}", record.id, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    pub async fn get_user_scans(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, RepositoryError> {
        // A single Scan call stops at 1 MB; walk every page.
        let mut pages = self
            .client
            .scan()
            .table_name(&self.scans_table)
            .filter_expression("user_id = :user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .into_paginator()
            .items()
            .send();

        let mut items = Vec::new();
        while let Some(item) = pages.next().await {
            items.push(item.map_err(|e| RepositoryError::DynamoDb(e.to_string()))?);
        }
        log::debug!("Scanned {} history rows for {}", items.len(), user_id);

        newest_first(items, limit)
    }

    pub async fn get_scan(
        &self,
        scan_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ScanRecord>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.scans_table)
            .key("id", AttributeValue::S(scan_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => {
                let record = parse_scan_from_item(item)?;
                Ok((record.user_id == user_id).then_some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_scan(&self, scan_id: Uuid, user_id: &str) -> Result<(), RepositoryError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.scans_table)
            .key("id", AttributeValue::S(scan_id.to_string()))
            .condition_expression("user_id = :user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let rejected = e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception());
                if rejected {
                    log::warn!("Delete of scan {} refused for user {}", scan_id, user_id);
                    Err(RepositoryError::NotFound)
                } else {
                    log::error!("DynamoDB delete_item failed for scan {}: {:?}", scan_id, e);
                    Err(RepositoryError::DynamoDb(e.to_string()))
                }
            }
        }
    }
}

impl MetadataStore for DynamoDbRepository {
    fn insert<'a>(
        &'a self,
        owner: &'a str,
        location: &'a str,
        scan: NewScan<'a>,
    ) -> BoxFuture<'a, Result<Uuid, RepositoryError>> {
        Box::pin(async move {
            let record = new_record(owner, location, scan);
            self.create_scan(&record).await?;
            Ok(record.id)
        })
    }

    fn query<'a>(
        &'a self,
        owner: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScanRecord>, RepositoryError>> {
        Box::pin(self.get_user_scans(owner, limit))
    }

    fn get<'a>(
        &'a self,
        record_id: Uuid,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<Option<ScanRecord>, RepositoryError>> {
        Box::pin(self.get_scan(record_id, owner))
    }

    fn delete<'a>(
        &'a self,
        record_id: Uuid,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.delete_scan(record_id, owner))
    }
}

pub fn scan_to_item(record: &ScanRecord) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
    let result = &record.result;
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(record.id.to_string()));
    item.insert("user_id".to_string(), AttributeValue::S(record.user_id.clone()));
    item.insert(
        "image_location".to_string(),
        AttributeValue::S(record.image_location.clone()),
    );
    item.insert("file_name".to_string(), AttributeValue::S(record.file_name.clone()));
    item.insert(
        "file_size".to_string(),
        AttributeValue::N(record.file_size.to_string()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );
    item.insert(
        "tumor_detected".to_string(),
        AttributeValue::Bool(result.tumor_detected),
    );
    item.insert(
        "confidence".to_string(),
        AttributeValue::N(result.confidence.to_string()),
    );
    item.insert(
        "tumor_level".to_string(),
        AttributeValue::S(result.tumor_level.to_string()),
    );
    item.insert("tumor_type".to_string(), AttributeValue::S(result.tumor_type.clone()));
    item.insert(
        "recommendations".to_string(),
        AttributeValue::L(
            result
                .recommendations
                .iter()
                .map(|r| AttributeValue::S(r.clone()))
                .collect(),
        ),
    );
    item.insert(
        "processing_time".to_string(),
        AttributeValue::N(result.processing_time.to_string()),
    );
    item.insert(
        "all_predictions".to_string(),
        AttributeValue::S(serde_json::to_string(&result.all_predictions)?),
    );
    Ok(item)
}

fn string_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Result<String, RepositoryError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", key)))
}

fn number_attr<T: FromStr>(item: &HashMap<String, AttributeValue>, key: &str) -> Result<T, RepositoryError> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse::<T>().ok())
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", key)))
}

/// Parses rows gathered from every scan page, newest first, capped at `limit`.
fn newest_first(
    items: impl IntoIterator<Item = HashMap<String, AttributeValue>>,
    limit: usize,
) -> Result<Vec<ScanRecord>, RepositoryError> {
    let mut records = items
        .into_iter()
        .map(parse_scan_from_item)
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records.truncate(limit);
    Ok(records)
}

pub fn parse_scan_from_item(item: HashMap<String, AttributeValue>) -> Result<ScanRecord, RepositoryError> {
    let id = Uuid::parse_str(&string_attr(&item, "id")?)
        .map_err(|_| RepositoryError::InvalidData("Invalid id".to_string()))?;

    let created_at = item
        .get("created_at")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| RepositoryError::InvalidData("Invalid created_at".to_string()))?;

    let tumor_detected = *item
        .get("tumor_detected")
        .and_then(|v| v.as_bool().ok())
        .ok_or_else(|| RepositoryError::InvalidData("Invalid tumor_detected".to_string()))?;

    let tumor_level = TumorLevel::from_str(&string_attr(&item, "tumor_level")?)
        .map_err(|_| RepositoryError::InvalidData("Invalid tumor_level".to_string()))?;

    let recommendations = item
        .get("recommendations")
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect::<Vec<_>>()
        })
        .ok_or_else(|| RepositoryError::InvalidData("Invalid recommendations".to_string()))?;

    let all_predictions: Vec<ClassPrediction> =
        serde_json::from_str(&string_attr(&item, "all_predictions")?)?;

    Ok(ScanRecord {
        id,
        user_id: string_attr(&item, "user_id")?,
        image_location: string_attr(&item, "image_location")?,
        file_name: string_attr(&item, "file_name")?,
        file_size: number_attr(&item, "file_size")?,
        created_at,
        result: AnalysisResult {
            tumor_detected,
            confidence: number_attr(&item, "confidence")?,
            tumor_level,
            tumor_type: string_attr(&item, "tumor_type")?,
            recommendations,
            processing_time: number_attr(&item, "processing_time")?,
            all_predictions,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ScanRecord {
        ScanRecord {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            image_location: "scans/user-1/1_abc.png".into(),
            file_name: "brain.png".into(),
            file_size: 2048,
            created_at: DateTime::parse_from_rfc3339("2026-10-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            result: AnalysisResult {
                tumor_detected: true,
                confidence: 78,
                tumor_level: TumorLevel::Medium,
                tumor_type: "Meningioma".into(),
                recommendations: vec![
                    "Meningioma detected with 78.2% confidence".into(),
                    "Immediate consultation with a neurosurgeon is recommended".into(),
                ],
                processing_time: 0.4375,
                all_predictions: vec![
                    ClassPrediction { class_name: "No Tumor".into(), confidence: 10 },
                    ClassPrediction { class_name: "Glioma".into(), confidence: 8 },
                    ClassPrediction { class_name: "Meningioma".into(), confidence: 78 },
                    ClassPrediction { class_name: "Pituitary Tumor".into(), confidence: 4 },
                ],
            },
        }
    }

    #[test]
    fn item_conversion_preserves_the_report() {
        let original = record();
        let parsed = parse_scan_from_item(scan_to_item(&original).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn empty_recommendations_survive() {
        let mut original = record();
        original.result.recommendations.clear();
        let parsed = parse_scan_from_item(scan_to_item(&original).unwrap()).unwrap();
        assert!(parsed.result.recommendations.is_empty());
    }

    #[test]
    fn unknown_tumor_level_is_invalid_data() {
        let mut item = scan_to_item(&record()).unwrap();
        item.insert("tumor_level".into(), AttributeValue::S("Enormous".into()));
        assert!(matches!(
            parse_scan_from_item(item),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn missing_owner_is_invalid_data() {
        let mut item = scan_to_item(&record()).unwrap();
        item.remove("user_id");
        assert!(matches!(
            parse_scan_from_item(item),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn rows_from_later_pages_are_ranked_with_the_rest() {
        let at = |stamp: &str| {
            let mut r = record();
            r.created_at = DateTime::parse_from_rfc3339(stamp).unwrap().with_timezone(&Utc);
            r
        };
        let first_page = [at("2026-10-01T08:00:00Z"), at("2026-10-03T08:00:00Z")];
        let last_page = [at("2026-10-05T08:00:00Z"), at("2026-10-02T08:00:00Z")];
        let rows = first_page
            .iter()
            .chain(last_page.iter())
            .map(|r| scan_to_item(r).unwrap());

        let records = newest_first(rows, 3).unwrap();
        let days: Vec<_> = records.iter().map(|r| r.created_at.format("%d").to_string()).collect();
        assert_eq!(days, ["05", "03", "02"]);
    }
}
