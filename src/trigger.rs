//! Defines a _trigger_, the classified input for one invocation. The
//! trigger is built from the first record of the inbound event, which
//! carries either an object-storage notification or a pub/sub
//! approval notification.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Maps upload bucket names to the media format handled by the
/// validation task.
pub const FORMAT_MAP: &[(&str, &str)] = &[
    ("rac-dev-av-upload-audio", "audio"),
    ("rac-dev-av-upload-video", "video"),
    ("rac-prod-av-upload-audio", "audio"),
    ("rac-prod-av-upload-video", "video"),
];

/// Look up the media format for an upload bucket. Unknown buckets are
/// an error: an upload we can't classify must fail the invocation
/// rather than launch a task with a bogus format.
pub fn media_format(bucket: &str) -> Result<&'static str> {
    FORMAT_MAP
        .iter()
        .find(|(name, _)| *name == bucket)
        .map(|(_, format)| *format)
        .ok_or_else(|| anyhow!("no media format mapped for bucket {:?}", bucket))
}

/// The raw inbound event, as delivered by the invoking platform.
#[derive(Debug, Deserialize)]
pub struct TriggerEvent {
    /// Event records; only the first one is inspected.
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

/// A single event record, carrying exactly one notification entity.
#[derive(Debug, Deserialize)]
pub struct EventRecord {
    /// Object-storage notification, if this is an upload event.
    pub s3: Option<S3Entity>,

    /// Pub/sub notification, if this is an approval event.
    #[serde(rename = "Sns")]
    pub sns: Option<SnsEntity>,
}

/// The object-storage portion of an upload record.
#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Deserialize)]
pub struct S3Bucket {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct S3Object {
    #[serde(default)]
    pub key: Option<String>,
}

/// The pub/sub portion of an approval record. Only the message
/// attributes are consumed.
#[derive(Debug, Deserialize)]
pub struct SnsEntity {
    #[serde(rename = "MessageAttributes", default)]
    pub message_attributes: HashMap<String, MessageAttribute>,
}

/// A named attribute attached to a pub/sub message.
#[derive(Debug, Deserialize)]
pub struct MessageAttribute {
    #[serde(rename = "Type", default)]
    pub data_type: Option<String>,

    #[serde(rename = "Value")]
    pub value: String,
}

/// A classified inbound event.
#[derive(Debug)]
pub enum Trigger {
    /// A new object landed in an upload bucket.
    Upload { bucket: String, key: String },

    /// A quality-control decision was published, with its message
    /// attributes flattened to plain values.
    Approval(HashMap<String, String>),
}

impl Trigger {
    /// Classify an inbound event by its first record. Events carrying
    /// neither notification entity are an error, surfaced as an
    /// invocation failure.
    pub fn from_event(event: TriggerEvent) -> Result<Self> {
        let record = event
            .records
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("event carried no records"))?;
        if let Some(s3) = record.s3 {
            let bucket = s3
                .bucket
                .name
                .ok_or_else(|| anyhow!("object-storage record is missing the bucket name"))?;
            let key = s3
                .object
                .key
                .ok_or_else(|| anyhow!("object-storage record is missing the object key"))?;
            Ok(Trigger::Upload { bucket, key })
        } else if let Some(sns) = record.sns {
            Ok(Trigger::Approval(
                sns.message_attributes
                    .into_iter()
                    .map(|(name, attribute)| (name, attribute.value))
                    .collect(),
            ))
        } else {
            Err(anyhow!("unable to determine the event source from the record"))
        }
    }
}
