use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;

#[test]
fn test_decode_integer() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
}

#[test]
fn test_decode_integer_invalid() {
    assert!(decode(b"i-0e").is_err());
    assert!(decode(b"i03e").is_err());
    assert!(decode(b"ie").is_err());
    assert!(decode(b"i4x2e").is_err());
    assert!(decode(b"i42").is_err());
}

#[test]
fn test_decode_bytes() {
    assert_eq!(
        decode(b"4:spam").unwrap(),
        Value::Bytes(Bytes::from_static(b"spam"))
    );
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::from_static(b"")));
}

#[test]
fn test_decode_bytes_truncated() {
    assert_eq!(decode(b"5:spam"), Err(BencodeError::UnexpectedEof));
    assert_eq!(decode(b"4"), Err(BencodeError::UnexpectedEof));
}

#[test]
fn test_decode_list() {
    let result = decode(b"l4:spami42ee").unwrap();
    match result {
        Value::List(l) => {
            assert_eq!(l.len(), 2);
            assert_eq!(l[0], Value::Bytes(Bytes::from_static(b"spam")));
            assert_eq!(l[1], Value::Integer(42));
        }
        _ => panic!("expected list"),
    }
}

#[test]
fn test_decode_dict() {
    let result = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
    match result {
        Value::Dict(d) => {
            assert_eq!(d.len(), 2);
            assert_eq!(
                d.get(&Bytes::from_static(b"cow")),
                Some(&Value::Bytes(Bytes::from_static(b"moo")))
            );
        }
        _ => panic!("expected dict"),
    }
}

#[test]
fn test_decode_dict_keys_out_of_order() {
    assert_eq!(
        decode(b"d4:spam4:eggs3:cow3:mooe"),
        Err(BencodeError::UnsortedKey { pos: 13 })
    );
}

#[test]
fn test_decode_dict_duplicate_key() {
    assert_eq!(
        decode(b"d3:cow3:moo3:cow3:bahe"),
        Err(BencodeError::DuplicateKey { pos: 11 })
    );
}

#[test]
fn test_decode_dict_key_not_a_string() {
    // An integer where a key is expected identifies the offending byte.
    assert_eq!(
        decode(b"di1e3:mooe"),
        Err(BencodeError::UnexpectedByte { byte: b'i', pos: 1 })
    );
}

#[test]
fn test_trailing_data_error() {
    assert_eq!(
        decode(b"i42eextra"),
        Err(BencodeError::TrailingData { pos: 4 })
    );
}

#[test]
fn test_encode_roundtrip() {
    let original: &[u8] = b"d8:announce15:http://test.com4:infod4:name4:test12:piece lengthi16384eee";
    let decoded = decode(original).unwrap();
    assert_eq!(encode(&decoded), original);
}

#[test]
fn test_encode_forms() {
    assert_eq!(encode(&Value::Integer(-7)), b"i-7e");
    assert_eq!(encode(&Value::string("spam")), b"4:spam");

    let list = Value::List(vec![Value::string("spam"), Value::Integer(42)]);
    assert_eq!(encode(&list), b"l4:spami42ee");

    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"cow"), Value::string("moo"));
    assert_eq!(encode(&Value::Dict(dict)), b"d3:cow3:mooe");
}

#[test]
fn test_decoder_dict_walk() {
    let data = b"d3:cow3:moo4:spami7ee";
    let mut dec = Decoder::new(data);
    dec.begin_dict().unwrap();

    let mut last = None;
    let key = dec.dict_key(&mut last).unwrap().unwrap();
    assert_eq!(key.as_ref(), b"cow");
    assert_eq!(dec.decode_value().unwrap(), Value::string("moo"));

    let key = dec.dict_key(&mut last).unwrap().unwrap();
    assert_eq!(key.as_ref(), b"spam");
    assert_eq!(dec.decode_value().unwrap(), Value::Integer(7));

    assert!(dec.dict_key(&mut last).unwrap().is_none());
    dec.expect_eof().unwrap();
}

#[test]
fn test_decoder_position_spans_value() {
    // The cursor exposes offsets so callers can capture a value's raw
    // byte span, which is how the info hash is computed.
    let data = b"d4:infod3:key5:valueee";
    let mut dec = Decoder::new(data);
    dec.begin_dict().unwrap();

    let mut last = None;
    let key = dec.dict_key(&mut last).unwrap().unwrap();
    assert_eq!(key.as_ref(), b"info");

    let start = dec.position();
    dec.decode_value().unwrap();
    let end = dec.position();
    assert_eq!(&data[start..end], b"d3:key5:valuee");
}

#[test]
fn test_nesting_limit() {
    let mut data = Vec::new();
    data.extend(std::iter::repeat_n(b'l', 80));
    data.extend(std::iter::repeat_n(b'e', 80));
    assert_eq!(decode(&data), Err(BencodeError::NestingTooDeep));
}

#[test]
fn test_value_accessors() {
    let value = Value::Integer(42);
    assert_eq!(value.as_integer(), Some(42));
    assert!(value.as_bytes().is_none());

    let value = Value::Bytes(Bytes::from_static(b"test"));
    assert_eq!(value.as_str(), Some("test"));
    assert!(value.as_integer().is_none());

    let value = Value::List(vec![]);
    assert!(value.as_list().is_some());
    assert!(value.as_dict().is_none());
}
