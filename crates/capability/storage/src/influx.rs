//! InfluxDB 1.x 样本存储实现
//!
//! - 写入：`POST /write?db=<database>&precision=ms`，请求体为行协议
//! - 探活：`GET /query?q=SHOW DATABASES`，返回库名列表

use crate::connection::{InfluxConnection, build_client};
use crate::error::StorageError;
use crate::line_protocol::sample_point;
use crate::traits::SampleStore;
use async_trait::async_trait;
use domain::{MeasurementPolicy, Sample};
use serde_json::Value;

/// InfluxDB 样本存储
#[derive(Clone)]
pub struct InfluxSampleStore {
    client: reqwest::Client,
    connection: InfluxConnection,
    measurement: MeasurementPolicy,
}

impl InfluxSampleStore {
    pub fn new(
        connection: InfluxConnection,
        measurement: MeasurementPolicy,
    ) -> Result<Self, StorageError> {
        let client = build_client(connection.timeout_ms)?;
        Ok(Self {
            client,
            connection,
            measurement,
        })
    }

    pub fn database(&self) -> &str {
        &self.connection.database
    }

    /// 查询服务端数据库列表（启动探活）。
    pub async fn database_names(&self) -> Result<Vec<String>, StorageError> {
        let request = self
            .client
            .get(self.connection.endpoint("query"))
            .query(&[("q", "SHOW DATABASES")]);
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::new(format!(
                "influxdb query rejected ({}): {}",
                status,
                body.trim()
            )));
        }
        let body: Value = response.json().await?;
        parse_database_names(&body)
    }

    /// 写入若干行行协议。
    pub async fn write_lines(&self, lines: &[String]) -> Result<(), StorageError> {
        if lines.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.connection.endpoint("write"))
            .query(&[
                ("db", self.connection.database.as_str()),
                ("precision", "ms"),
            ])
            .body(lines.join("\n"));
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::new(format!(
                "influxdb write rejected ({}): {}",
                status,
                body.trim()
            )));
        }
        Ok(())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.connection.username.as_ref() {
            Some(username) => request.basic_auth(username, self.connection.password.as_ref()),
            None => request,
        }
    }
}

#[async_trait]
impl SampleStore for InfluxSampleStore {
    async fn write_sample(&self, sample: &Sample) -> Result<(), StorageError> {
        let line = sample_point(sample, &self.measurement).to_line()?;
        self.write_lines(&[line]).await
    }
}

/// 解析 `SHOW DATABASES` 响应。
///
/// ```text
/// {"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["oee"]]}]}]}
/// ```
pub fn parse_database_names(body: &Value) -> Result<Vec<String>, StorageError> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(StorageError::new(format!("influxdb error: {}", error)));
    }
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::new("influxdb response has no results"))?;

    let mut names = Vec::new();
    for result in results {
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(StorageError::new(format!("influxdb error: {}", error)));
        }
        let series = result
            .get("series")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for serie in series {
            let values = serie
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for row in values {
                if let Some(name) = row.get(0).and_then(Value::as_str) {
                    names.push(name.to_string());
                }
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_databases() {
        let body: Value = serde_json::from_str(
            r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["oee"]]}]}]}"#,
        )
        .expect("json");
        let names = parse_database_names(&body).expect("names");
        assert_eq!(names, vec!["_internal".to_string(), "oee".to_string()]);
    }

    #[test]
    fn empty_server_has_no_databases() {
        let body: Value =
            serde_json::from_str(r#"{"results":[{"statement_id":0}]}"#).expect("json");
        assert!(parse_database_names(&body).expect("names").is_empty());
    }

    #[test]
    fn statement_error_is_reported() {
        let body: Value = serde_json::from_str(
            r#"{"results":[{"statement_id":0,"error":"authorization failed"}]}"#,
        )
        .expect("json");
        let err = parse_database_names(&body).expect_err("error");
        assert_eq!(err.to_string(), "influxdb error: authorization failed");
    }

    #[test]
    fn endpoint_joins_paths() {
        let connection = InfluxConnection {
            base_url: "http://localhost:8086/".to_string(),
            database: "oee".to_string(),
            username: None,
            password: None,
            timeout_ms: 1000,
        };
        assert_eq!(connection.endpoint("write"), "http://localhost:8086/write");
    }
}
