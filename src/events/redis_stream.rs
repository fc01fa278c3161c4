//! Wire-level parsing shared by every Redis Streams consumer in this crate.
//! Manual `redis::Value` destructuring is needed here because redis 0.21's
//! `FromRedisValue` has no typed path for the nested reply shapes `XREADGROUP`
//! and `XAUTOCLAIM` return.

use redis::Value as RedisValue;

pub type StreamEntry = (String, Vec<(String, String)>);

/// Parses an `XREADGROUP` reply of the shape
/// `[[stream, [[id, [field, value, ...]], ...]], ...]`, or `None` for the
/// `nil` reply returned when `BLOCK` times out with nothing pending.
pub fn parse_streams_reply(value: RedisValue) -> Option<Vec<(String, Vec<StreamEntry>)>> {
    let RedisValue::Bulk(streams) = value else {
        return None;
    };

    let mut out = Vec::with_capacity(streams.len());
    for stream_entry in streams {
        let RedisValue::Bulk(mut pair) = stream_entry else {
            continue;
        };
        if pair.len() != 2 {
            continue;
        }
        let entries_val = pair.pop().unwrap();
        let name_val = pair.pop().unwrap();
        let Some(name) = redis_value_to_string(&name_val) else {
            continue;
        };
        let RedisValue::Bulk(entries) = entries_val else {
            continue;
        };

        out.push((name, parse_entry_list(entries)));
    }

    Some(out)
}

/// Parses the `[next-cursor, [[id, [field, value, ...]], ...], ...]` reply of
/// `XAUTOCLAIM`. The trailing deleted-ids array (present on newer Redis
/// versions) is ignored; only the claimed entries are returned.
pub fn parse_autoclaim_reply(value: RedisValue) -> Vec<StreamEntry> {
    let RedisValue::Bulk(mut parts) = value else {
        return Vec::new();
    };
    if parts.len() < 2 {
        return Vec::new();
    }

    let entries_val = parts.remove(1);
    let RedisValue::Bulk(entries) = entries_val else {
        return Vec::new();
    };

    parse_entry_list(entries)
}

fn parse_entry_list(entries: Vec<RedisValue>) -> Vec<StreamEntry> {
    let mut parsed_entries = Vec::with_capacity(entries.len());
    for entry in entries {
        let RedisValue::Bulk(mut entry_pair) = entry else {
            continue;
        };
        if entry_pair.len() != 2 {
            continue;
        }
        let fields_val = entry_pair.pop().unwrap();
        let id_val = entry_pair.pop().unwrap();
        let Some(id) = redis_value_to_string(&id_val) else {
            continue;
        };
        let RedisValue::Bulk(flat_fields) = fields_val else {
            continue;
        };

        let mut fields = Vec::with_capacity(flat_fields.len() / 2);
        let mut it = flat_fields.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            if let (Some(k), Some(v)) = (redis_value_to_string(&k), redis_value_to_string(&v)) {
                fields.push((k, v));
            }
        }
        parsed_entries.push((id, fields));
    }
    parsed_entries
}

pub fn redis_value_to_string(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::Data(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        RedisValue::Status(s) => Some(s.clone()),
        _ => None,
    }
}
