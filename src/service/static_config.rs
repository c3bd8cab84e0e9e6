// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Immutable service description, fixed at creation and checked on every
// open. It is stored once per service as a FlatBuffer behind a small fixed
// header (see service::builder) and decoded by every opener.

use flatbuffers::{FlatBufferBuilder, WIPOffset};

use crate::payload::ZeroCopySend;
use crate::port::EventId;
use crate::service::attribute::{AttributeKey, AttributeSet, AttributeValue};
use crate::service::service_name::ServiceName;
use crate::service::{MessagingPattern, ServiceId};

// ---------------------------------------------------------------------------
// Type descriptors
// ---------------------------------------------------------------------------

/// Whether a payload is a single value or a runtime-sized slice of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeVariant {
    FixedSize = 0,
    Dynamic = 1,
}

impl TypeVariant {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::FixedSize),
            1 => Some(Self::Dynamic),
            _ => None,
        }
    }
}

/// `(variant, name, size, alignment)` of one type as seen by its process.
/// For slices the size and alignment are those of one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDetail {
    variant: TypeVariant,
    type_name: String,
    size: usize,
    alignment: usize,
}

impl TypeDetail {
    pub(crate) fn new<T: ZeroCopySend>(variant: TypeVariant) -> Self {
        Self {
            variant,
            type_name: T::type_name().to_string(),
            size: std::mem::size_of::<T>(),
            alignment: std::mem::align_of::<T>(),
        }
    }

    pub fn variant(&self) -> TypeVariant {
        self.variant
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// `self` is the requested type, `existing` the one stored in the service.
    fn is_compatible_to(&self, existing: &TypeDetail) -> bool {
        !self.type_name.is_empty()
            && self.variant == existing.variant
            && self.type_name == existing.type_name
            && self.size == existing.size
            && self.alignment <= existing.alignment
    }
}

/// Layout of every chunk a publish-subscribe service moves around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageTypeDetails {
    header: TypeDetail,
    user_header: TypeDetail,
    payload: TypeDetail,
}

impl MessageTypeDetails {
    pub(crate) fn new(header: TypeDetail, user_header: TypeDetail, payload: TypeDetail) -> Self {
        Self {
            header,
            user_header,
            payload,
        }
    }

    pub fn header(&self) -> &TypeDetail {
        &self.header
    }

    pub fn user_header(&self) -> &TypeDetail {
        &self.user_header
    }

    pub fn payload(&self) -> &TypeDetail {
        &self.payload
    }

    /// The sample header must be identical; user header and payload must match
    /// by name, variant and size, and may be stored with a stricter alignment.
    pub fn is_compatible_to(&self, existing: &MessageTypeDetails) -> bool {
        self.header == existing.header
            && self.user_header.is_compatible_to(&existing.user_header)
            && self.payload.is_compatible_to(&existing.payload)
    }
}

// ---------------------------------------------------------------------------
// Pattern specific settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSubscribeConfig {
    pub(crate) max_subscribers: usize,
    pub(crate) max_publishers: usize,
    pub(crate) max_nodes: usize,
    pub(crate) history_size: usize,
    pub(crate) subscriber_max_buffer_size: usize,
    pub(crate) subscriber_max_borrowed_samples: usize,
    pub(crate) enable_safe_overflow: bool,
    pub(crate) message_type_details: MessageTypeDetails,
}

impl PublishSubscribeConfig {
    pub fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }

    pub fn max_publishers(&self) -> usize {
        self.max_publishers
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    pub fn subscriber_max_buffer_size(&self) -> usize {
        self.subscriber_max_buffer_size
    }

    pub fn subscriber_max_borrowed_samples(&self) -> usize {
        self.subscriber_max_borrowed_samples
    }

    pub fn has_safe_overflow(&self) -> bool {
        self.enable_safe_overflow
    }

    pub fn message_type_details(&self) -> &MessageTypeDetails {
        &self.message_type_details
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    pub(crate) max_notifiers: usize,
    pub(crate) max_listeners: usize,
    pub(crate) max_nodes: usize,
    pub(crate) event_id_max_value: usize,
    pub(crate) notifier_created_event: Option<usize>,
    pub(crate) notifier_dropped_event: Option<usize>,
}

impl EventConfig {
    pub fn max_notifiers(&self) -> usize {
        self.max_notifiers
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn event_id_max_value(&self) -> usize {
        self.event_id_max_value
    }

    pub fn notifier_created_event(&self) -> Option<EventId> {
        self.notifier_created_event.map(EventId::new)
    }

    pub fn notifier_dropped_event(&self) -> Option<EventId> {
        self.notifier_dropped_event.map(EventId::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingPatternConfig {
    PublishSubscribe(PublishSubscribeConfig),
    Event(EventConfig),
}

// ---------------------------------------------------------------------------
// StaticConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticConfig {
    service_id: ServiceId,
    service_name: ServiceName,
    attributes: AttributeSet,
    messaging_pattern: MessagingPatternConfig,
}

impl StaticConfig {
    pub(crate) fn new(
        service_name: &ServiceName,
        attributes: AttributeSet,
        messaging_pattern: MessagingPatternConfig,
    ) -> Self {
        let pattern = match &messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(_) => MessagingPattern::PublishSubscribe,
            MessagingPatternConfig::Event(_) => MessagingPattern::Event,
        };
        Self {
            service_id: ServiceId::new(service_name, pattern),
            service_name: service_name.clone(),
            attributes,
            messaging_pattern,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn name(&self) -> &ServiceName {
        &self.service_name
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn messaging_pattern(&self) -> MessagingPattern {
        match self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(_) => MessagingPattern::PublishSubscribe,
            MessagingPatternConfig::Event(_) => MessagingPattern::Event,
        }
    }

    pub fn publish_subscribe(&self) -> Option<&PublishSubscribeConfig> {
        match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => Some(c),
            MessagingPatternConfig::Event(_) => None,
        }
    }

    pub fn event(&self) -> Option<&EventConfig> {
        match &self.messaging_pattern {
            MessagingPatternConfig::Event(c) => Some(c),
            MessagingPatternConfig::PublishSubscribe(_) => None,
        }
    }

    pub(crate) fn max_nodes(&self) -> usize {
        match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => c.max_nodes,
            MessagingPatternConfig::Event(c) => c.max_nodes,
        }
    }

    /// Capacity of the producer side (publishers or notifiers).
    pub(crate) fn max_producers(&self) -> usize {
        match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => c.max_publishers,
            MessagingPatternConfig::Event(c) => c.max_notifiers,
        }
    }

    /// Capacity of the consumer side (subscribers or listeners).
    pub(crate) fn max_consumers(&self) -> usize {
        match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => c.max_subscribers,
            MessagingPatternConfig::Event(c) => c.max_listeners,
        }
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::with_capacity(512);

        let name = fbb.create_string(self.service_name.as_str());
        let attrs: Vec<WIPOffset<record::AttributeRecord>> = self
            .attributes
            .iter()
            .map(|a| record::build_attribute(&mut fbb, a.key(), a.value()))
            .collect();
        let attrs = fbb.create_vector(&attrs);

        let types = match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => {
                let d = &c.message_type_details;
                Some((
                    record::build_type(&mut fbb, &d.header),
                    record::build_type(&mut fbb, &d.user_header),
                    record::build_type(&mut fbb, &d.payload),
                ))
            }
            MessagingPatternConfig::Event(_) => None,
        };

        let start = fbb.start_table();
        fbb.push_slot::<u64>(record::ServiceRecord::VT_SERVICE_ID, self.service_id.value(), 0);
        fbb.push_slot_always::<WIPOffset<_>>(record::ServiceRecord::VT_NAME, name);
        fbb.push_slot::<u8>(
            record::ServiceRecord::VT_PATTERN,
            self.messaging_pattern() as u8,
            0,
        );
        fbb.push_slot_always::<WIPOffset<_>>(record::ServiceRecord::VT_ATTRIBUTES, attrs);
        fbb.push_slot::<u64>(record::ServiceRecord::VT_MAX_NODES, self.max_nodes() as u64, 0);
        fbb.push_slot::<u64>(
            record::ServiceRecord::VT_MAX_PRODUCERS,
            self.max_producers() as u64,
            0,
        );
        fbb.push_slot::<u64>(
            record::ServiceRecord::VT_MAX_CONSUMERS,
            self.max_consumers() as u64,
            0,
        );
        match &self.messaging_pattern {
            MessagingPatternConfig::PublishSubscribe(c) => {
                fbb.push_slot::<u64>(
                    record::ServiceRecord::VT_HISTORY_SIZE,
                    c.history_size as u64,
                    0,
                );
                fbb.push_slot::<u64>(
                    record::ServiceRecord::VT_SUBSCRIBER_MAX_BUFFER_SIZE,
                    c.subscriber_max_buffer_size as u64,
                    0,
                );
                fbb.push_slot::<u64>(
                    record::ServiceRecord::VT_SUBSCRIBER_MAX_BORROWED_SAMPLES,
                    c.subscriber_max_borrowed_samples as u64,
                    0,
                );
                fbb.push_slot::<bool>(
                    record::ServiceRecord::VT_ENABLE_SAFE_OVERFLOW,
                    c.enable_safe_overflow,
                    false,
                );
            }
            MessagingPatternConfig::Event(c) => {
                fbb.push_slot::<u64>(
                    record::ServiceRecord::VT_EVENT_ID_MAX_VALUE,
                    c.event_id_max_value as u64,
                    0,
                );
                fbb.push_slot::<i64>(
                    record::ServiceRecord::VT_NOTIFIER_CREATED_EVENT,
                    optional_id(c.notifier_created_event),
                    -1,
                );
                fbb.push_slot::<i64>(
                    record::ServiceRecord::VT_NOTIFIER_DROPPED_EVENT,
                    optional_id(c.notifier_dropped_event),
                    -1,
                );
            }
        }
        if let Some((header, user_header, payload)) = types {
            fbb.push_slot_always::<WIPOffset<_>>(record::ServiceRecord::VT_HEADER, header);
            fbb.push_slot_always::<WIPOffset<_>>(record::ServiceRecord::VT_USER_HEADER, user_header);
            fbb.push_slot_always::<WIPOffset<_>>(record::ServiceRecord::VT_PAYLOAD, payload);
        }
        let end = fbb.end_table(start);
        let root: WIPOffset<record::ServiceRecord> = WIPOffset::new(end.value());
        fbb.finish_minimal(root);
        fbb.finished_data().to_vec()
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let r = flatbuffers::root::<record::ServiceRecord>(bytes)?;

        let name = r.name().ok_or(RecordError::MissingField("name"))?;
        let service_name = ServiceName::new(name).map_err(|_| RecordError::InvalidName)?;

        let mut attributes = AttributeSet::new();
        if let Some(list) = r.attributes() {
            for a in list.iter() {
                let key = a.key().ok_or(RecordError::MissingField("attribute key"))?;
                let value = a.value().unwrap_or("");
                attributes.push(
                    AttributeKey::new(key).map_err(|_| RecordError::InvalidName)?,
                    AttributeValue::new(value).map_err(|_| RecordError::InvalidName)?,
                );
            }
        }

        let pattern =
            MessagingPattern::from_u8(r.pattern()).ok_or(RecordError::MissingField("pattern"))?;
        let messaging_pattern = match pattern {
            MessagingPattern::PublishSubscribe => {
                let header = decode_type(r.header(), "header")?;
                let user_header = decode_type(r.user_header(), "user header")?;
                let payload = decode_type(r.payload(), "payload")?;
                MessagingPatternConfig::PublishSubscribe(PublishSubscribeConfig {
                    max_subscribers: r.max_consumers() as usize,
                    max_publishers: r.max_producers() as usize,
                    max_nodes: r.max_nodes() as usize,
                    history_size: r.history_size() as usize,
                    subscriber_max_buffer_size: r.subscriber_max_buffer_size() as usize,
                    subscriber_max_borrowed_samples: r.subscriber_max_borrowed_samples() as usize,
                    enable_safe_overflow: r.enable_safe_overflow(),
                    message_type_details: MessageTypeDetails::new(header, user_header, payload),
                })
            }
            MessagingPattern::Event => MessagingPatternConfig::Event(EventConfig {
                max_notifiers: r.max_producers() as usize,
                max_listeners: r.max_consumers() as usize,
                max_nodes: r.max_nodes() as usize,
                event_id_max_value: r.event_id_max_value() as usize,
                notifier_created_event: id_from_record(r.notifier_created_event()),
                notifier_dropped_event: id_from_record(r.notifier_dropped_event()),
            }),
        };

        let decoded = Self::new(&service_name, attributes, messaging_pattern);
        if decoded.service_id.value() != r.service_id() {
            return Err(RecordError::IdMismatch);
        }
        Ok(decoded)
    }
}

fn optional_id(id: Option<usize>) -> i64 {
    id.map(|v| v as i64).unwrap_or(-1)
}

fn id_from_record(v: i64) -> Option<usize> {
    if v < 0 {
        None
    } else {
        Some(v as usize)
    }
}

fn decode_type(
    r: Option<record::TypeRecord<'_>>,
    field: &'static str,
) -> Result<TypeDetail, RecordError> {
    let r = r.ok_or(RecordError::MissingField(field))?;
    Ok(TypeDetail {
        variant: TypeVariant::from_u8(r.variant()).ok_or(RecordError::MissingField(field))?,
        type_name: r.type_name().unwrap_or("").to_string(),
        size: r.size() as usize,
        alignment: r.alignment() as usize,
    })
}

/// Why a stored service record could not be decoded.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RecordError {
    #[error("invalid flatbuffer: {0}")]
    Invalid(#[from] flatbuffers::InvalidFlatbuffer),
    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),
    #[error("stored name is not a valid name")]
    InvalidName,
    #[error("stored service id does not match the stored name")]
    IdMismatch,
}

// ---------------------------------------------------------------------------
// FlatBuffer tables
//
// table TypeRecord      { variant: ubyte; type_name: string; size: ulong; alignment: ulong; }
// table AttributeRecord { key: string; value: string; }
// table ServiceRecord   { service_id: ulong; name: string; pattern: ubyte;
//                         attributes: [AttributeRecord]; max_nodes: ulong;
//                         max_producers: ulong; max_consumers: ulong;
//                         history_size: ulong; subscriber_max_buffer_size: ulong;
//                         subscriber_max_borrowed_samples: ulong;
//                         enable_safe_overflow: bool; header: TypeRecord;
//                         user_header: TypeRecord; payload: TypeRecord;
//                         event_id_max_value: ulong;
//                         notifier_created_event: long = -1;
//                         notifier_dropped_event: long = -1; }
// ---------------------------------------------------------------------------

mod record {
    use flatbuffers::{FlatBufferBuilder, ForwardsUOffset, Table, VOffsetT, Vector, WIPOffset};

    use super::TypeDetail;
    use crate::service::attribute::{AttributeKey, AttributeValue};

    #[derive(Copy, Clone)]
    pub struct TypeRecord<'a> {
        _tab: Table<'a>,
    }

    impl<'a> flatbuffers::Follow<'a> for TypeRecord<'a> {
        type Inner = TypeRecord<'a>;

        #[inline]
        unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
            Self {
                _tab: Table::new(buf, loc),
            }
        }
    }

    impl<'a> TypeRecord<'a> {
        pub const VT_VARIANT: VOffsetT = 4;
        pub const VT_TYPE_NAME: VOffsetT = 6;
        pub const VT_SIZE: VOffsetT = 8;
        pub const VT_ALIGNMENT: VOffsetT = 10;

        // Safety for every accessor: the table was verified against the
        // field types declared in `run_verifier`.
        pub fn variant(&self) -> u8 {
            unsafe { self._tab.get::<u8>(Self::VT_VARIANT, Some(0)).unwrap_or(0) }
        }

        pub fn type_name(&self) -> Option<&'a str> {
            unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_TYPE_NAME, None) }
        }

        pub fn size(&self) -> u64 {
            unsafe { self._tab.get::<u64>(Self::VT_SIZE, Some(0)).unwrap_or(0) }
        }

        pub fn alignment(&self) -> u64 {
            unsafe { self._tab.get::<u64>(Self::VT_ALIGNMENT, Some(0)).unwrap_or(0) }
        }
    }

    impl flatbuffers::Verifiable for TypeRecord<'_> {
        #[inline]
        fn run_verifier(
            v: &mut flatbuffers::Verifier,
            pos: usize,
        ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
            v.visit_table(pos)?
                .visit_field::<u8>("variant", Self::VT_VARIANT, false)?
                .visit_field::<ForwardsUOffset<&str>>("type_name", Self::VT_TYPE_NAME, false)?
                .visit_field::<u64>("size", Self::VT_SIZE, false)?
                .visit_field::<u64>("alignment", Self::VT_ALIGNMENT, false)?
                .finish();
            Ok(())
        }
    }

    #[derive(Copy, Clone)]
    pub struct AttributeRecord<'a> {
        _tab: Table<'a>,
    }

    impl<'a> flatbuffers::Follow<'a> for AttributeRecord<'a> {
        type Inner = AttributeRecord<'a>;

        #[inline]
        unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
            Self {
                _tab: Table::new(buf, loc),
            }
        }
    }

    impl<'a> AttributeRecord<'a> {
        pub const VT_KEY: VOffsetT = 4;
        pub const VT_VALUE: VOffsetT = 6;

        pub fn key(&self) -> Option<&'a str> {
            unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_KEY, None) }
        }

        pub fn value(&self) -> Option<&'a str> {
            unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_VALUE, None) }
        }
    }

    impl flatbuffers::Verifiable for AttributeRecord<'_> {
        #[inline]
        fn run_verifier(
            v: &mut flatbuffers::Verifier,
            pos: usize,
        ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
            v.visit_table(pos)?
                .visit_field::<ForwardsUOffset<&str>>("key", Self::VT_KEY, true)?
                .visit_field::<ForwardsUOffset<&str>>("value", Self::VT_VALUE, false)?
                .finish();
            Ok(())
        }
    }

    #[derive(Copy, Clone)]
    pub struct ServiceRecord<'a> {
        _tab: Table<'a>,
    }

    impl<'a> flatbuffers::Follow<'a> for ServiceRecord<'a> {
        type Inner = ServiceRecord<'a>;

        #[inline]
        unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
            Self {
                _tab: Table::new(buf, loc),
            }
        }
    }

    impl<'a> ServiceRecord<'a> {
        pub const VT_SERVICE_ID: VOffsetT = 4;
        pub const VT_NAME: VOffsetT = 6;
        pub const VT_PATTERN: VOffsetT = 8;
        pub const VT_ATTRIBUTES: VOffsetT = 10;
        pub const VT_MAX_NODES: VOffsetT = 12;
        pub const VT_MAX_PRODUCERS: VOffsetT = 14;
        pub const VT_MAX_CONSUMERS: VOffsetT = 16;
        pub const VT_HISTORY_SIZE: VOffsetT = 18;
        pub const VT_SUBSCRIBER_MAX_BUFFER_SIZE: VOffsetT = 20;
        pub const VT_SUBSCRIBER_MAX_BORROWED_SAMPLES: VOffsetT = 22;
        pub const VT_ENABLE_SAFE_OVERFLOW: VOffsetT = 24;
        pub const VT_HEADER: VOffsetT = 26;
        pub const VT_USER_HEADER: VOffsetT = 28;
        pub const VT_PAYLOAD: VOffsetT = 30;
        pub const VT_EVENT_ID_MAX_VALUE: VOffsetT = 32;
        pub const VT_NOTIFIER_CREATED_EVENT: VOffsetT = 34;
        pub const VT_NOTIFIER_DROPPED_EVENT: VOffsetT = 36;

        fn scalar_u64(&self, slot: VOffsetT) -> u64 {
            unsafe { self._tab.get::<u64>(slot, Some(0)).unwrap_or(0) }
        }

        pub fn service_id(&self) -> u64 {
            self.scalar_u64(Self::VT_SERVICE_ID)
        }

        pub fn name(&self) -> Option<&'a str> {
            unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_NAME, None) }
        }

        pub fn pattern(&self) -> u8 {
            unsafe { self._tab.get::<u8>(Self::VT_PATTERN, Some(0)).unwrap_or(0) }
        }

        pub fn attributes(&self) -> Option<Vector<'a, ForwardsUOffset<AttributeRecord<'a>>>> {
            unsafe {
                self._tab
                    .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<AttributeRecord<'a>>>>>(
                        Self::VT_ATTRIBUTES,
                        None,
                    )
            }
        }

        pub fn max_nodes(&self) -> u64 {
            self.scalar_u64(Self::VT_MAX_NODES)
        }

        pub fn max_producers(&self) -> u64 {
            self.scalar_u64(Self::VT_MAX_PRODUCERS)
        }

        pub fn max_consumers(&self) -> u64 {
            self.scalar_u64(Self::VT_MAX_CONSUMERS)
        }

        pub fn history_size(&self) -> u64 {
            self.scalar_u64(Self::VT_HISTORY_SIZE)
        }

        pub fn subscriber_max_buffer_size(&self) -> u64 {
            self.scalar_u64(Self::VT_SUBSCRIBER_MAX_BUFFER_SIZE)
        }

        pub fn subscriber_max_borrowed_samples(&self) -> u64 {
            self.scalar_u64(Self::VT_SUBSCRIBER_MAX_BORROWED_SAMPLES)
        }

        pub fn enable_safe_overflow(&self) -> bool {
            unsafe {
                self._tab
                    .get::<bool>(Self::VT_ENABLE_SAFE_OVERFLOW, Some(false))
                    .unwrap_or(false)
            }
        }

        pub fn header(&self) -> Option<TypeRecord<'a>> {
            unsafe { self._tab.get::<ForwardsUOffset<TypeRecord>>(Self::VT_HEADER, None) }
        }

        pub fn user_header(&self) -> Option<TypeRecord<'a>> {
            unsafe { self._tab.get::<ForwardsUOffset<TypeRecord>>(Self::VT_USER_HEADER, None) }
        }

        pub fn payload(&self) -> Option<TypeRecord<'a>> {
            unsafe { self._tab.get::<ForwardsUOffset<TypeRecord>>(Self::VT_PAYLOAD, None) }
        }

        pub fn event_id_max_value(&self) -> u64 {
            self.scalar_u64(Self::VT_EVENT_ID_MAX_VALUE)
        }

        pub fn notifier_created_event(&self) -> i64 {
            unsafe {
                self._tab
                    .get::<i64>(Self::VT_NOTIFIER_CREATED_EVENT, Some(-1))
                    .unwrap_or(-1)
            }
        }

        pub fn notifier_dropped_event(&self) -> i64 {
            unsafe {
                self._tab
                    .get::<i64>(Self::VT_NOTIFIER_DROPPED_EVENT, Some(-1))
                    .unwrap_or(-1)
            }
        }
    }

    impl flatbuffers::Verifiable for ServiceRecord<'_> {
        #[inline]
        fn run_verifier(
            v: &mut flatbuffers::Verifier,
            pos: usize,
        ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
            v.visit_table(pos)?
                .visit_field::<u64>("service_id", Self::VT_SERVICE_ID, false)?
                .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, true)?
                .visit_field::<u8>("pattern", Self::VT_PATTERN, false)?
                .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<AttributeRecord>>>>(
                    "attributes",
                    Self::VT_ATTRIBUTES,
                    false,
                )?
                .visit_field::<u64>("max_nodes", Self::VT_MAX_NODES, false)?
                .visit_field::<u64>("max_producers", Self::VT_MAX_PRODUCERS, false)?
                .visit_field::<u64>("max_consumers", Self::VT_MAX_CONSUMERS, false)?
                .visit_field::<u64>("history_size", Self::VT_HISTORY_SIZE, false)?
                .visit_field::<u64>(
                    "subscriber_max_buffer_size",
                    Self::VT_SUBSCRIBER_MAX_BUFFER_SIZE,
                    false,
                )?
                .visit_field::<u64>(
                    "subscriber_max_borrowed_samples",
                    Self::VT_SUBSCRIBER_MAX_BORROWED_SAMPLES,
                    false,
                )?
                .visit_field::<bool>("enable_safe_overflow", Self::VT_ENABLE_SAFE_OVERFLOW, false)?
                .visit_field::<ForwardsUOffset<TypeRecord>>("header", Self::VT_HEADER, false)?
                .visit_field::<ForwardsUOffset<TypeRecord>>(
                    "user_header",
                    Self::VT_USER_HEADER,
                    false,
                )?
                .visit_field::<ForwardsUOffset<TypeRecord>>("payload", Self::VT_PAYLOAD, false)?
                .visit_field::<u64>("event_id_max_value", Self::VT_EVENT_ID_MAX_VALUE, false)?
                .visit_field::<i64>(
                    "notifier_created_event",
                    Self::VT_NOTIFIER_CREATED_EVENT,
                    false,
                )?
                .visit_field::<i64>(
                    "notifier_dropped_event",
                    Self::VT_NOTIFIER_DROPPED_EVENT,
                    false,
                )?
                .finish();
            Ok(())
        }
    }

    pub fn build_type<'fbb>(
        fbb: &mut FlatBufferBuilder<'fbb>,
        detail: &TypeDetail,
    ) -> WIPOffset<TypeRecord<'fbb>> {
        let type_name = fbb.create_string(&detail.type_name);
        let start = fbb.start_table();
        fbb.push_slot::<u64>(TypeRecord::VT_SIZE, detail.size as u64, 0);
        fbb.push_slot::<u64>(TypeRecord::VT_ALIGNMENT, detail.alignment as u64, 0);
        fbb.push_slot_always::<WIPOffset<_>>(TypeRecord::VT_TYPE_NAME, type_name);
        fbb.push_slot::<u8>(TypeRecord::VT_VARIANT, detail.variant as u8, 0);
        let end = fbb.end_table(start);
        WIPOffset::new(end.value())
    }

    pub fn build_attribute<'fbb>(
        fbb: &mut FlatBufferBuilder<'fbb>,
        key: &AttributeKey,
        value: &AttributeValue,
    ) -> WIPOffset<AttributeRecord<'fbb>> {
        let key = fbb.create_string(key.as_str());
        let value = fbb.create_string(value.as_str());
        let start = fbb.start_table();
        fbb.push_slot_always::<WIPOffset<_>>(AttributeRecord::VT_KEY, key);
        fbb.push_slot_always::<WIPOffset<_>>(AttributeRecord::VT_VALUE, value);
        let end = fbb.end_table(start);
        WIPOffset::new(end.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadType;

    fn pubsub_config(payload: TypeDetail) -> StaticConfig {
        let mut attributes = AttributeSet::new();
        attributes.push(
            AttributeKey::new("owner").unwrap(),
            AttributeValue::new("audio").unwrap(),
        );
        attributes.push(
            AttributeKey::new("owner").unwrap(),
            AttributeValue::new("").unwrap(),
        );
        StaticConfig::new(
            &ServiceName::new("svc/decode").unwrap(),
            attributes,
            MessagingPatternConfig::PublishSubscribe(PublishSubscribeConfig {
                max_subscribers: 3,
                max_publishers: 2,
                max_nodes: 4,
                history_size: 0,
                subscriber_max_buffer_size: 5,
                subscriber_max_borrowed_samples: 1,
                enable_safe_overflow: false,
                message_type_details: MessageTypeDetails::new(
                    <u64 as PayloadType>::type_detail(),
                    <() as PayloadType>::type_detail(),
                    payload,
                ),
            }),
        )
    }

    #[test]
    fn publish_subscribe_record_decodes_to_same_config() {
        let config = pubsub_config(<[u16] as PayloadType>::type_detail());
        let decoded = StaticConfig::decode(&config.encode()).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.attributes().len(), 2);
    }

    #[test]
    fn event_record_keeps_optional_ids() {
        let config = StaticConfig::new(
            &ServiceName::new("svc/event").unwrap(),
            AttributeSet::new(),
            MessagingPatternConfig::Event(EventConfig {
                max_notifiers: 1,
                max_listeners: 2,
                max_nodes: 3,
                event_id_max_value: 0,
                notifier_created_event: Some(0),
                notifier_dropped_event: None,
            }),
        );
        let decoded = StaticConfig::decode(&config.encode()).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.event().unwrap().notifier_created_event(), Some(EventId::new(0)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(StaticConfig::decode(&[0xff; 16]).is_err());
        assert!(StaticConfig::decode(&[]).is_err());
    }

    #[test]
    fn type_compatibility_rules() {
        let stored = TypeDetail {
            variant: TypeVariant::FixedSize,
            type_name: "Foo".into(),
            size: 8,
            alignment: 8,
        };
        let mut requested = stored.clone();
        assert!(requested.is_compatible_to(&stored));

        requested.alignment = 4;
        assert!(requested.is_compatible_to(&stored));
        requested.alignment = 16;
        assert!(!requested.is_compatible_to(&stored));

        let mut other = stored.clone();
        other.size = 4;
        assert!(!other.is_compatible_to(&stored));

        let mut slice = stored.clone();
        slice.variant = TypeVariant::Dynamic;
        assert!(!slice.is_compatible_to(&stored));

        let unnamed = TypeDetail {
            type_name: String::new(),
            ..stored.clone()
        };
        assert!(!unnamed.is_compatible_to(&unnamed.clone()));
    }
}
