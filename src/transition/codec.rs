//! TLV8 wire format of transition control requests and responses.
//!
//! Write request:
//! - `0x01` fetch: `{ 0x01 characteristic id }`
//! - `0x02` start: repeated `0x01` transition entries, separated by `0x00`
//!
//! Transition entry:
//! - `0x01` characteristic id, `0x02` controller context, `0x03` end behavior
//! - `0x04` linear curve: repeated `0x01` points `{ 0x01 target, 0x02
//!   completion, 0x03 delay }`, `0x02` start condition
//! - `0x05` derived curve: repeated `0x01` points `{ 0x01 scale, 0x02 offset,
//!   0x03 completion, 0x04 delay }`, `0x02` source id, `0x03` source range
//!   `{ 0x01 lower, 0x02 upper }`
//! - `0x06` update interval, `0x07` value-change threshold, `0x08`
//!   time-interval threshold
//!
//! Read response: `0x01` fetched transition, or `0x02` transition state made
//! of `0x01` active contexts `{ 0x01 id, 0x02 context, 0x03 elapsed }`.

use super::pool::SlotId;
use super::{
    ActiveContext, EndBehavior, PointPayload, StartCondition, SupportedTransition, Transition,
    TransitionKind, TransitionPoint, TransitionStore,
};
use super::timing::{update_linear_rates, update_point_times};
use crate::common::constants::{
    DEFAULT_UPDATE_INTERVAL_MS, MAX_CONTROLLER_CONTEXT_BYTES, MAX_TRANSITION_TLV_BYTES,
    MAXIMUM_UPDATE_INTERVAL_MS,
};
use crate::error::{AdaptiveLightError, Result};
use crate::tlv::{NarrowInt, Tlv, TlvReader, TlvWriter, decode_f32, decode_u8, decode_uint};

pub mod request {
    pub const FETCH: u8 = 0x01;
    pub const START: u8 = 0x02;
    pub const FETCH_ID: u8 = 0x01;
    pub const START_ENTRY: u8 = 0x01;
}

pub mod field {
    pub const CHARACTERISTIC_ID: u8 = 0x01;
    pub const CONTROLLER_CONTEXT: u8 = 0x02;
    pub const END_BEHAVIOR: u8 = 0x03;
    pub const LINEAR_CURVE: u8 = 0x04;
    pub const DERIVED_CURVE: u8 = 0x05;
    pub const UPDATE_INTERVAL: u8 = 0x06;
    pub const VALUE_CHANGE_THRESHOLD: u8 = 0x07;
    pub const TIME_INTERVAL_THRESHOLD: u8 = 0x08;
}

mod curve {
    pub const POINT: u8 = 0x01;
    pub const START_CONDITION: u8 = 0x02;
    pub const SOURCE_ID: u8 = 0x02;
    pub const SOURCE_RANGE: u8 = 0x03;

    pub const LINEAR_TARGET: u8 = 0x01;
    pub const LINEAR_COMPLETION: u8 = 0x02;
    pub const LINEAR_DELAY: u8 = 0x03;

    pub const DERIVED_SCALE: u8 = 0x01;
    pub const DERIVED_OFFSET: u8 = 0x02;
    pub const DERIVED_COMPLETION: u8 = 0x03;
    pub const DERIVED_DELAY: u8 = 0x04;

    pub const RANGE_LOWER: u8 = 0x01;
    pub const RANGE_UPPER: u8 = 0x02;
}

pub mod response {
    pub const TRANSITION: u8 = 0x01;
    pub const STATE: u8 = 0x02;
    pub const ACTIVE_CONTEXT: u8 = 0x01;
    pub const CONTEXT_ID: u8 = 0x01;
    pub const CONTEXT_DATA: u8 = 0x02;
    pub const CONTEXT_ELAPSED: u8 = 0x03;

    pub const SUPPORTED_ENTRY: u8 = 0x01;
    pub const SUPPORTED_ID: u8 = 0x01;
    pub const SUPPORTED_TYPES: u8 = 0x02;
}

/// One operation of a control-point write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOperation {
    Fetch { characteristic_id: u64 },
    /// Raw transition entries, parsed by the engine
    Start { entries: Vec<Vec<u8>> },
}

/// Split a control-point write into operations, ignoring unknown types.
pub fn parse_write_request(bytes: &[u8]) -> Result<Vec<WriteOperation>> {
    let mut operations = Vec::new();

    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            request::FETCH => {
                let mut id = None;
                for inner in TlvReader::new(&item.value).read_all()? {
                    if inner.ty == request::FETCH_ID {
                        set_once(&mut id, decode_uint(&inner.value)?, "fetch characteristic id")?;
                    }
                }
                let characteristic_id = id.ok_or_else(|| {
                    AdaptiveLightError::invalid("fetch request without a characteristic id")
                })?;
                operations.push(WriteOperation::Fetch { characteristic_id });
            }
            request::START => {
                let mut entries = Vec::new();
                for inner in TlvReader::new(&item.value).read_all()? {
                    if inner.ty != request::START_ENTRY {
                        continue;
                    }
                    if inner.value.len() > MAX_TRANSITION_TLV_BYTES {
                        return Err(AdaptiveLightError::out_of_resources(format!(
                            "transition entry of {} bytes exceeds {MAX_TRANSITION_TLV_BYTES}",
                            inner.value.len()
                        )));
                    }
                    entries.push(inner.value);
                }
                operations.push(WriteOperation::Start { entries });
            }
            _ => {}
        }
    }
    Ok(operations)
}

/// Values carried over from storage when a transition is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreContext {
    pub request_time: u64,
    pub threshold: Option<i32>,
    pub service_id: u64,
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<()> {
    if slot.is_some() {
        return Err(AdaptiveLightError::invalid(format!("duplicate {what}")));
    }
    *slot = Some(value);
    Ok(())
}

enum CurveDraft {
    Linear {
        start_condition: StartCondition,
        points: Vec<TransitionPoint>,
    },
    Derived {
        source_id: u64,
        lower: NarrowInt,
        upper: NarrowInt,
        points: Vec<TransitionPoint>,
    },
}

fn parse_linear_point(bytes: &[u8]) -> Result<TransitionPoint> {
    let (mut target, mut completion, mut delay) = (None, None, None);
    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            curve::LINEAR_TARGET => set_once(&mut target, NarrowInt::from_bytes(&item.value)?, "target")?,
            curve::LINEAR_COMPLETION => {
                set_once(&mut completion, decode_uint(&item.value)?, "completion duration")?
            }
            curve::LINEAR_DELAY => set_once(&mut delay, decode_uint(&item.value)?, "start delay")?,
            _ => {}
        }
    }
    let target = target.ok_or_else(|| AdaptiveLightError::invalid("linear point without target"))?;
    Ok(TransitionPoint::linear(
        target,
        completion.unwrap_or(0),
        delay.unwrap_or(0),
    ))
}

fn parse_derived_point(bytes: &[u8]) -> Result<TransitionPoint> {
    let (mut scale, mut offset, mut completion, mut delay) = (None, None, None, None);
    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            curve::DERIVED_SCALE => set_once(&mut scale, decode_f32(&item.value)?, "scale")?,
            curve::DERIVED_OFFSET => set_once(&mut offset, decode_f32(&item.value)?, "offset")?,
            curve::DERIVED_COMPLETION => {
                set_once(&mut completion, decode_uint(&item.value)?, "completion duration")?
            }
            curve::DERIVED_DELAY => set_once(&mut delay, decode_uint(&item.value)?, "start delay")?,
            _ => {}
        }
    }
    let scale = scale.ok_or_else(|| AdaptiveLightError::invalid("derived point without scale"))?;
    Ok(TransitionPoint::derived(
        scale,
        offset.unwrap_or(0.0),
        completion.unwrap_or(0),
        delay.unwrap_or(0),
    ))
}

fn parse_linear_curve(bytes: &[u8]) -> Result<CurveDraft> {
    let mut points = Vec::new();
    let mut start_condition = None;
    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            curve::POINT => points.push(parse_linear_point(&item.value)?),
            curve::START_CONDITION => set_once(
                &mut start_condition,
                StartCondition::from_raw(decode_u8(&item.value)?),
                "start condition",
            )?,
            _ => {}
        }
    }
    Ok(CurveDraft::Linear {
        start_condition: start_condition.unwrap_or(StartCondition::None),
        points,
    })
}

fn parse_source_range(bytes: &[u8]) -> Result<(NarrowInt, NarrowInt)> {
    let (mut lower, mut upper) = (None, None);
    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            curve::RANGE_LOWER => set_once(&mut lower, NarrowInt::from_bytes(&item.value)?, "lower bound")?,
            curve::RANGE_UPPER => set_once(&mut upper, NarrowInt::from_bytes(&item.value)?, "upper bound")?,
            _ => {}
        }
    }
    match (lower, upper) {
        (Some(lower), Some(upper)) => Ok((lower, upper)),
        _ => Err(AdaptiveLightError::invalid("source range needs both bounds")),
    }
}

fn parse_derived_curve(bytes: &[u8]) -> Result<CurveDraft> {
    let mut points = Vec::new();
    let (mut source_id, mut range) = (None, None);
    for item in TlvReader::new(bytes).read_all()? {
        match item.ty {
            curve::POINT => points.push(parse_derived_point(&item.value)?),
            curve::SOURCE_ID => set_once(&mut source_id, decode_uint(&item.value)?, "source id")?,
            curve::SOURCE_RANGE => set_once(&mut range, parse_source_range(&item.value)?, "source range")?,
            _ => {}
        }
    }
    let source_id =
        source_id.ok_or_else(|| AdaptiveLightError::invalid("derived curve without source id"))?;
    let (lower, upper) =
        range.ok_or_else(|| AdaptiveLightError::invalid("derived curve without source range"))?;
    Ok(CurveDraft::Derived {
        source_id,
        lower,
        upper,
        points,
    })
}

/// Parse one transition entry into `staging`.
///
/// `now` is the logical time of the request. The initial value of the
/// characteristic comes from `value_request`. Point times are rebased on the
/// request time and linear rates computed, so the staged transition is ready
/// for validation.
pub fn parse_transition<F>(
    bytes: &[u8],
    staging: &mut TransitionStore,
    now: u64,
    service_id: u64,
    restore: Option<&RestoreContext>,
    mut value_request: F,
) -> Result<SlotId>
where
    F: FnMut(u64) -> i32,
{
    let mut characteristic_id = None;
    let mut context: Option<Vec<u8>> = None;
    let mut end_behavior = None;
    let mut curve_draft: Option<CurveDraft> = None;
    let mut update_interval = None;
    let mut value_threshold = None;
    let mut time_threshold = None;

    for Tlv { ty, value } in TlvReader::new(bytes).read_all()? {
        match ty {
            field::CHARACTERISTIC_ID => {
                set_once(&mut characteristic_id, decode_uint(&value)?, "characteristic id")?
            }
            field::CONTROLLER_CONTEXT => {
                if value.len() > MAX_CONTROLLER_CONTEXT_BYTES {
                    return Err(AdaptiveLightError::invalid(format!(
                        "controller context of {} bytes exceeds {MAX_CONTROLLER_CONTEXT_BYTES}",
                        value.len()
                    )));
                }
                set_once(&mut context, value, "controller context")?
            }
            field::END_BEHAVIOR => set_once(
                &mut end_behavior,
                EndBehavior::from_raw(decode_u8(&value)?),
                "end behavior",
            )?,
            field::LINEAR_CURVE => set_once(&mut curve_draft, parse_linear_curve(&value)?, "curve")?,
            field::DERIVED_CURVE => {
                set_once(&mut curve_draft, parse_derived_curve(&value)?, "curve")?
            }
            field::UPDATE_INTERVAL => {
                set_once(&mut update_interval, decode_uint(&value)?, "update interval")?
            }
            field::VALUE_CHANGE_THRESHOLD => set_once(
                &mut value_threshold,
                NarrowInt::from_bytes(&value)?.value(),
                "value change threshold",
            )?,
            field::TIME_INTERVAL_THRESHOLD => {
                set_once(&mut time_threshold, decode_uint(&value)?, "time interval threshold")?
            }
            _ => {}
        }
    }

    let characteristic_id = characteristic_id
        .ok_or_else(|| AdaptiveLightError::invalid("transition without characteristic id"))?;

    let update_interval = update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL_MS);
    if update_interval == 0 || update_interval > MAXIMUM_UPDATE_INTERVAL_MS {
        return Err(AdaptiveLightError::invalid(format!(
            "update interval {update_interval} ms is out of range"
        )));
    }

    let request_time = restore.map_or(now, |r| r.request_time);
    let service_id = restore.map_or(service_id, |r| r.service_id);
    let current_value = value_request(characteristic_id);

    let mut transition = Transition::new(characteristic_id, service_id, request_time);
    transition.current_value = current_value;
    transition.controller_context = context.unwrap_or_default();
    transition.end_behavior = end_behavior.unwrap_or(EndBehavior::Stop);
    transition.update_interval = update_interval;
    transition.value_change_threshold = value_threshold.unwrap_or(0).max(0);
    transition.time_interval_threshold = time_threshold.unwrap_or(update_interval);

    let points = match curve_draft {
        Some(CurveDraft::Linear {
            start_condition,
            points,
        }) => {
            let threshold = restore
                .and_then(|r| r.threshold)
                .unwrap_or(current_value);
            transition.kind = Some(TransitionKind::Linear {
                start_condition,
                threshold,
            });
            points
        }
        Some(CurveDraft::Derived {
            source_id,
            lower,
            upper,
            points,
        }) => {
            transition.kind = Some(TransitionKind::LinearDerived {
                source_id,
                lower,
                upper,
            });
            points
        }
        None => Vec::new(),
    };

    let id = staging.allocate(transition)?;
    for point in points {
        staging.push_point(id, point)?;
    }

    let (transition, pool) = staging
        .split_mut(id)
        .ok_or_else(|| AdaptiveLightError::invalid("staged transition vanished"))?;
    update_point_times(transition, pool, request_time)?;
    update_linear_rates(transition, pool)?;
    Ok(id)
}

fn encode_point(w: &mut TlvWriter, point: &TransitionPoint) -> Result<()> {
    w.append_nested(curve::POINT, |p| match point.payload {
        PointPayload::Linear { target, .. } => {
            p.append_narrow(curve::LINEAR_TARGET, target)?;
            p.append_uint(curve::LINEAR_COMPLETION, point.completion_duration)?;
            if point.start_delay > 0 {
                p.append_uint(curve::LINEAR_DELAY, point.start_delay)?;
            }
            Ok(())
        }
        PointPayload::Derived { scale, offset } => {
            p.append_f32(curve::DERIVED_SCALE, scale)?;
            p.append_f32(curve::DERIVED_OFFSET, offset)?;
            p.append_uint(curve::DERIVED_COMPLETION, point.completion_duration)?;
            if point.start_delay > 0 {
                p.append_uint(curve::DERIVED_DELAY, point.start_delay)?;
            }
            Ok(())
        }
    })
}

fn encode_points(w: &mut TlvWriter, points: &[TransitionPoint]) -> Result<()> {
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            w.append_separator()?;
        }
        encode_point(w, point)?;
    }
    Ok(())
}

/// Write the fields of one transition entry, in the layout a start request
/// uses.
pub fn encode_transition(
    w: &mut TlvWriter,
    transition: &Transition,
    points: &[TransitionPoint],
) -> Result<()> {
    w.append_uint(field::CHARACTERISTIC_ID, transition.characteristic_id)?;
    if !transition.controller_context.is_empty() {
        w.append(field::CONTROLLER_CONTEXT, &transition.controller_context)?;
    }
    w.append_u8(field::END_BEHAVIOR, transition.end_behavior.raw())?;

    match transition.kind {
        Some(TransitionKind::Linear {
            start_condition, ..
        }) => w.append_nested(field::LINEAR_CURVE, |c| {
            encode_points(c, points)?;
            if start_condition != StartCondition::None {
                c.append_u8(curve::START_CONDITION, start_condition.raw())?;
            }
            Ok(())
        })?,
        Some(TransitionKind::LinearDerived {
            source_id,
            lower,
            upper,
        }) => w.append_nested(field::DERIVED_CURVE, |c| {
            encode_points(c, points)?;
            c.append_uint(curve::SOURCE_ID, source_id)?;
            c.append_nested(curve::SOURCE_RANGE, |r| {
                r.append_narrow(curve::RANGE_LOWER, lower)?;
                r.append_narrow(curve::RANGE_UPPER, upper)
            })
        })?,
        None => {}
    }

    w.append_uint(field::UPDATE_INTERVAL, transition.update_interval)?;
    if transition.value_change_threshold > 0 {
        w.append_narrow(
            field::VALUE_CHANGE_THRESHOLD,
            NarrowInt::fit(transition.value_change_threshold),
        )?;
    }
    w.append_uint(field::TIME_INTERVAL_THRESHOLD, transition.time_interval_threshold)
}

/// Encode one transition entry on its own, as persisted in storage.
pub fn encode_transition_entry(transition: &Transition, points: &[TransitionPoint]) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(MAX_TRANSITION_TLV_BYTES);
    encode_transition(&mut w, transition, points)?;
    Ok(w.into_bytes())
}

/// Read response for a fetch; empty when the characteristic has no
/// transition.
pub fn encode_fetch_response(
    found: Option<(&Transition, &[TransitionPoint])>,
    limit: usize,
) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(limit);
    if let Some((transition, points)) = found {
        w.append_nested(response::TRANSITION, |t| encode_transition(t, transition, points))?;
    }
    Ok(w.into_bytes())
}

pub fn encode_transition_state(contexts: &[ActiveContext], limit: usize) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(limit);
    w.append_nested(response::STATE, |s| {
        for (i, context) in contexts.iter().enumerate() {
            if i > 0 {
                s.append_separator()?;
            }
            s.append_nested(response::ACTIVE_CONTEXT, |c| {
                c.append_uint(response::CONTEXT_ID, context.characteristic_id)?;
                c.append(response::CONTEXT_DATA, &context.controller_context)?;
                c.append_uint(response::CONTEXT_ELAPSED, context.time_elapsed_ms)
            })?;
        }
        Ok(())
    })?;
    Ok(w.into_bytes())
}

pub fn encode_supported(entries: &[SupportedTransition], limit: usize) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(limit);
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            w.append_separator()?;
        }
        w.append_nested(response::SUPPORTED_ENTRY, |e| {
            e.append_uint(response::SUPPORTED_ID, entry.characteristic_id)?;
            e.append_u8(response::SUPPORTED_TYPES, entry.types)
        })?;
    }
    Ok(w.into_bytes())
}

/// Build a fetch write request.
pub fn encode_fetch_request(characteristic_id: u64) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(MAX_TRANSITION_TLV_BYTES);
    w.append_nested(request::FETCH, |f| f.append_uint(request::FETCH_ID, characteristic_id))?;
    Ok(w.into_bytes())
}

/// Build a start write request from pre-encoded transition entries.
pub fn encode_start_request(entries: &[Vec<u8>], limit: usize) -> Result<Vec<u8>> {
    let mut w = TlvWriter::new(limit);
    w.append_nested(request::START, |s| {
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                s.append_separator()?;
            }
            s.append(request::START_ENTRY, entry)?;
        }
        Ok(())
    })?;
    Ok(w.into_bytes())
}

/// Decoded form of a transition-state read response.
pub fn decode_transition_state(bytes: &[u8]) -> Result<Vec<ActiveContext>> {
    let mut contexts = Vec::new();
    for item in TlvReader::new(bytes).read_all()? {
        if item.ty != response::STATE {
            continue;
        }
        for entry in TlvReader::new(&item.value).read_all()? {
            if entry.ty != response::ACTIVE_CONTEXT {
                continue;
            }
            let mut context = ActiveContext {
                characteristic_id: 0,
                controller_context: Vec::new(),
                time_elapsed_ms: 0,
            };
            for field in TlvReader::new(&entry.value).read_all()? {
                match field.ty {
                    response::CONTEXT_ID => context.characteristic_id = decode_uint(&field.value)?,
                    response::CONTEXT_DATA => context.controller_context = field.value,
                    response::CONTEXT_ELAPSED => context.time_elapsed_ms = decode_uint(&field.value)?,
                    _ => {}
                }
            }
            contexts.push(context);
        }
    }
    Ok(contexts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TRANSITION_TYPE_LINEAR;

    fn linear_entry(id: u64, points: &[(i32, u64, u64)], interval: Option<u64>) -> Vec<u8> {
        let mut w = TlvWriter::new(MAX_TRANSITION_TLV_BYTES);
        w.append_uint(field::CHARACTERISTIC_ID, id).unwrap();
        w.append(field::CONTROLLER_CONTEXT, b"ctx").unwrap();
        w.append_nested(field::LINEAR_CURVE, |c| {
            for (i, &(target, completion, delay)) in points.iter().enumerate() {
                if i > 0 {
                    c.append_separator()?;
                }
                c.append_nested(curve::POINT, |p| {
                    p.append_narrow(curve::LINEAR_TARGET, NarrowInt::fit(target))?;
                    p.append_uint(curve::LINEAR_COMPLETION, completion)?;
                    p.append_uint(curve::LINEAR_DELAY, delay)
                })?;
            }
            Ok(())
        })
        .unwrap();
        if let Some(interval) = interval {
            w.append_uint(field::UPDATE_INTERVAL, interval).unwrap();
        }
        w.into_bytes()
    }

    #[test]
    fn test_parse_linear_transition() {
        let entry = linear_entry(0x12, &[(50, 1_000, 0), (90, 4_000, 0)], Some(1_000));
        let mut staging = TransitionStore::new(2, 8);
        let id = parse_transition(&entry, &mut staging, 10_000, 0x10, None, |_| 60).unwrap();

        let t = staging.get(id).unwrap();
        assert_eq!(t.characteristic_id, 0x12);
        assert_eq!(t.current_value, 60);
        assert_eq!(t.threshold(), Some(60));
        assert_eq!(t.request_time, 10_000);
        assert_eq!(t.update_interval, 1_000);
        assert_eq!(t.time_interval_threshold, 1_000);
        assert_eq!(t.controller_context, b"ctx");

        let points = staging.points_of(id);
        assert_eq!((points[0].start_time, points[0].end_time), (10_000, 11_000));
        assert_eq!((points[1].start_time, points[1].end_time), (11_000, 15_000));
        assert!(matches!(points[1].payload, PointPayload::Linear { rate, .. } if rate == 0.01));
    }

    #[test]
    fn test_defaults_and_restore_context() {
        let entry = linear_entry(0x12, &[(50, 1_000, 0)], None);
        let mut staging = TransitionStore::new(2, 8);
        let restore = RestoreContext {
            request_time: 500,
            threshold: Some(7),
            service_id: 0x20,
        };
        let id = parse_transition(&entry, &mut staging, 10_000, 0x10, Some(&restore), |_| 60).unwrap();
        let t = staging.get(id).unwrap();
        assert_eq!(t.update_interval, DEFAULT_UPDATE_INTERVAL_MS);
        assert_eq!(t.time_interval_threshold, DEFAULT_UPDATE_INTERVAL_MS);
        assert_eq!(t.threshold(), Some(7));
        assert_eq!(t.request_time, 500);
        assert_eq!(t.service_id, 0x20);
        assert_eq!(staging.points_of(id)[0].start_time, 500);
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        let mut staging = TransitionStore::new(2, 8);

        let mut w = TlvWriter::new(64);
        w.append_uint(field::CHARACTERISTIC_ID, 1).unwrap();
        w.append_uint(field::CHARACTERISTIC_ID, 2).unwrap();
        let err = parse_transition(&w.into_bytes(), &mut staging, 0, 0x10, None, |_| 0).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let mut w = TlvWriter::new(64);
        w.append_u8(field::END_BEHAVIOR, 1).unwrap();
        assert!(parse_transition(&w.into_bytes(), &mut staging, 0, 0x10, None, |_| 0).is_err());

        let entry = linear_entry(0x12, &[(50, 1_000, 0)], Some(0));
        assert!(parse_transition(&entry, &mut staging, 0, 0x10, None, |_| 0).is_err());
    }

    #[test]
    fn test_write_request_parsing() {
        let entry = linear_entry(0x12, &[(50, 1_000, 0)], None);
        let mut bytes = encode_start_request(&[entry.clone(), entry.clone()], 4096).unwrap();
        bytes.extend(encode_fetch_request(0x12).unwrap());
        // Unknown operation types are skipped
        bytes.extend_from_slice(&[0x7F, 0x01, 0x00]);

        let ops = parse_write_request(&bytes).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            WriteOperation::Start {
                entries: vec![entry.clone(), entry]
            }
        );
        assert_eq!(ops[1], WriteOperation::Fetch { characteristic_id: 0x12 });
    }

    #[test]
    fn test_oversized_start_entry() {
        let mut entry = linear_entry(0x12, &[(50, 1_000, 0)], None);
        let mut w = TlvWriter::new(4096);
        w.append(0x70, &[0u8; MAX_TRANSITION_TLV_BYTES]).unwrap();
        entry.extend(w.into_bytes());
        let request = encode_start_request(&[entry], 8192).unwrap();
        let err = parse_write_request(&request).unwrap_err();
        assert!(matches!(err, AdaptiveLightError::OutOfResources(_)));
    }

    #[test]
    fn test_fetch_response_mirrors_start_format() {
        let entry = linear_entry(0x12, &[(50, 1_000, 250), (-3, 4_000, 0)], Some(2_000));
        let mut staging = TransitionStore::new(2, 8);
        let id = parse_transition(&entry, &mut staging, 0, 0x10, None, |_| 0).unwrap();
        let points = staging.points_of(id);
        let response = encode_fetch_response(Some((staging.get(id).unwrap(), points.as_slice())), 4096).unwrap();

        let outer = TlvReader::new(&response).read_all().unwrap();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].ty, response::TRANSITION);

        // The fetched body parses back into an equivalent transition
        let mut again = TransitionStore::new(2, 8);
        let id2 = parse_transition(&outer[0].value, &mut again, 0, 0x10, None, |_| 0).unwrap();
        assert_eq!(again.points_of(id2), points);
        assert_eq!(again.get(id2).unwrap().update_interval, 2_000);

        assert!(encode_fetch_response(None, 4096).unwrap().is_empty());
    }

    #[test]
    fn test_value_threshold_omitted_when_zero() {
        let mut t = Transition::new(0x12, 0x10, 0);
        t.time_interval_threshold = 5_000;
        let bytes = encode_transition_entry(&t, &[]).unwrap();
        let types: Vec<u8> = TlvReader::new(&bytes)
            .read_all()
            .unwrap()
            .iter()
            .map(|tlv| tlv.ty)
            .collect();
        assert!(!types.contains(&field::VALUE_CHANGE_THRESHOLD));
        assert!(types.contains(&field::TIME_INTERVAL_THRESHOLD));
    }

    #[test]
    fn test_transition_state_encoding() {
        let contexts = vec![
            ActiveContext {
                characteristic_id: 0x12,
                controller_context: vec![1, 2, 3],
                time_elapsed_ms: 30_000,
            },
            ActiveContext {
                characteristic_id: 0x13,
                controller_context: Vec::new(),
                time_elapsed_ms: 5,
            },
        ];
        let bytes = encode_transition_state(&contexts, 4096).unwrap();
        assert_eq!(decode_transition_state(&bytes).unwrap(), contexts);

        let empty = encode_transition_state(&[], 4096).unwrap();
        assert_eq!(empty, vec![response::STATE, 0]);
    }

    #[test]
    fn test_supported_encoding() {
        let entries = [
            SupportedTransition::new(0x12, TRANSITION_TYPE_LINEAR),
            SupportedTransition::new(0x13, 0x03),
        ];
        let bytes = encode_supported(&entries, 4096).unwrap();
        let items = TlvReader::new(&bytes).read_all().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[1].is_separator());
        let second = TlvReader::new(&items[2].value).read_all().unwrap();
        assert_eq!(decode_uint(&second[0].value).unwrap(), 0x13);
        assert_eq!(second[1].value, vec![0x03]);
    }
}
