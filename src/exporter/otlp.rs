//! OTLP (OpenTelemetry Protocol) encoding of export batches.
//!
//! Every batch becomes one `ExportLogsServiceRequest` holding a single
//! `ResourceLogs` for the configured service and a single `ScopeLogs` for
//! this library.

use super::batch::Batch;
use crate::domain::{AttributeValue, LogEvent};
use bytes::Bytes;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use prost::Message;
use thiserror::Error;

/// Instrumentation scope and SDK name reported with every batch.
pub const SCOPE_NAME: &str = "rask-log-sampler";

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Batch is empty")]
    EmptyBatch,
    #[error("Protobuf encoding failed: {0}")]
    Encode(#[from] prost::EncodeError),
}

#[derive(Debug, Clone)]
pub struct OtlpSerializer {
    service_name: String,
    sdk_version: String,
}

impl OtlpSerializer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Encodes a batch into protobuf bytes ready for the HTTP body.
    pub fn serialize_batch(&self, batch: &Batch) -> Result<Bytes, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let request = self.build_request(batch.entries());
        let mut buf = Vec::with_capacity(request.encoded_len());
        request.encode(&mut buf)?;

        Ok(Bytes::from(buf))
    }

    pub fn build_request(&self, events: &[LogEvent]) -> ExportLogsServiceRequest {
        let resource = Resource {
            attributes: vec![
                string_kv("service.name", &self.service_name),
                string_kv("telemetry.sdk.name", SCOPE_NAME),
                string_kv("telemetry.sdk.version", &self.sdk_version),
            ],
            dropped_attributes_count: 0,
            entity_refs: vec![],
        };

        let observed_time_unix_nano = chrono::Utc::now()
            .timestamp_nanos_opt()
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);

        let log_records = events
            .iter()
            .map(|event| create_log_record(event, observed_time_unix_nano))
            .collect();

        let scope_logs = vec![ScopeLogs {
            scope: Some(InstrumentationScope {
                name: SCOPE_NAME.to_string(),
                version: self.sdk_version.clone(),
                attributes: vec![],
                dropped_attributes_count: 0,
            }),
            log_records,
            schema_url: String::new(),
        }];

        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(resource),
                scope_logs,
                schema_url: String::new(),
            }],
        }
    }
}

fn create_log_record(event: &LogEvent, observed_time_unix_nano: u64) -> LogRecord {
    let severity_text = event.severity.as_str();
    let severity_number = event.severity.otlp_number();

    let mut attributes: Vec<KeyValue> = event
        .attributes
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: Some(any_value(value)),
        })
        .collect();
    attributes.push(string_kv("severity_text", severity_text));
    attributes.push(int_kv("severity_number", severity_number as i64));

    LogRecord {
        time_unix_nano: event.timestamp_nanos(),
        observed_time_unix_nano,
        severity_number,
        severity_text: severity_text.to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(event.message.clone())),
        }),
        attributes,
        dropped_attributes_count: 0,
        flags: 0,
        trace_id: vec![],
        span_id: vec![],
        event_name: String::new(),
    }
}

fn any_value(value: &AttributeValue) -> AnyValue {
    let value = match value {
        AttributeValue::String(s) => any_value::Value::StringValue(s.clone()),
        AttributeValue::Int(i) => any_value::Value::IntValue(*i),
        AttributeValue::Float(f) => any_value::Value::DoubleValue(*f),
        AttributeValue::Bool(b) => any_value::Value::BoolValue(*b),
    };
    AnyValue { value: Some(value) }
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn int_kv(key: &str, value: i64) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::IntValue(value)),
        }),
    }
}
