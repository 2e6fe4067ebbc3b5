use super::value::Value;

/// Encodes a bencode value to a byte vector.
///
/// The output is canonical: integers as `i<number>e`, byte strings as
/// `<length>:<data>`, lists as `l<items>e`, and dictionaries as
/// `d<key><value>...e` with keys in lexicographic order (guaranteed by
/// the `BTreeMap` backing [`Value::Dict`]).
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf);
    buf
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            buf.extend_from_slice(format!("i{}e", i).as_bytes());
        }
        Value::Bytes(b) => {
            buf.extend_from_slice(format!("{}:", b.len()).as_bytes());
            buf.extend_from_slice(b);
        }
        Value::List(l) => {
            buf.push(b'l');
            for item in l {
                encode_value(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dict(d) => {
            buf.push(b'd');
            for (key, val) in d {
                buf.extend_from_slice(format!("{}:", key.len()).as_bytes());
                buf.extend_from_slice(key);
                encode_value(val, buf);
            }
            buf.push(b'e');
        }
    }
}
