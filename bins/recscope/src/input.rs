use std::path::Path;

use base64::Engine;

use recscope_api::{KafkaHeader, UintSize};
use recscope_engine::SerdeConfig;

use crate::cli::{ConfigArgs, KeyInput, ValueInput};
use crate::error::CliError;

pub fn load_config(args: &ConfigArgs) -> Result<SerdeConfig, CliError> {
    match &args.config {
        Some(path) => {
            let config = SerdeConfig::load(path)?;
            tracing::info!(config = %path, "loaded config");
            Ok(config)
        }
        None => Ok(SerdeConfig::default()),
    }
}

fn payload(
    context: &'static str,
    text: &Option<String>,
    b64: &Option<String>,
    file: &Option<impl AsRef<Path>>,
) -> Result<Option<Vec<u8>>, CliError> {
    if let Some(text) = text {
        return Ok(Some(text.clone().into_bytes()));
    }
    if let Some(encoded) = b64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CliError::input(context, e))?;
        return Ok(Some(bytes));
    }
    if let Some(path) = file {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| CliError::input(context, format!("'{}': {e}", path.display())))?;
        return Ok(Some(bytes));
    }
    Ok(None)
}

pub fn key_bytes(input: &KeyInput) -> Result<Option<Vec<u8>>, CliError> {
    payload("key", &input.key, &input.key_base64, &input.key_file)
}

pub fn value_bytes(input: &ValueInput) -> Result<Option<Vec<u8>>, CliError> {
    payload("value", &input.value, &input.value_base64, &input.value_file)
}

/// `key=value` pairs, in the order given.
pub fn headers(raw: &[String]) -> Result<Vec<KafkaHeader>, CliError> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CliError::input("header", format!("'{pair}' is not KEY=VALUE")))?;
            Ok(KafkaHeader {
                key: key.to_string(),
                value: value.as_bytes().to_vec(),
            })
        })
        .collect()
}

pub fn uint_size(bytes: u8) -> Result<UintSize, CliError> {
    match bytes {
        1 => Ok(UintSize::U8),
        2 => Ok(UintSize::U16),
        4 => Ok(UintSize::U32),
        8 => Ok(UintSize::U64),
        other => Err(CliError::input("uint-size", format!("{other} is not one of 1, 2, 4, 8"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers() {
        let parsed = headers(&["a=1".into(), "b=x=y".into()]).unwrap();
        assert_eq!(parsed[0].key, "a");
        assert_eq!(parsed[1].value, b"x=y");
        assert!(headers(&["novalue".into()]).is_err());
    }

    #[test]
    fn reads_each_payload_source() {
        let text = ValueInput {
            value: Some("hi".into()),
            ..Default::default()
        };
        assert_eq!(value_bytes(&text).unwrap(), Some(b"hi".to_vec()));

        let b64 = KeyInput {
            key_base64: Some("AAE=".into()),
            ..Default::default()
        };
        assert_eq!(key_bytes(&b64).unwrap(), Some(vec![0x00, 0x01]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.bin");
        std::fs::write(&path, [0xde, 0xad]).unwrap();
        let file = ValueInput {
            value_file: Some(path),
            ..Default::default()
        };
        assert_eq!(value_bytes(&file).unwrap(), Some(vec![0xde, 0xad]));

        assert_eq!(value_bytes(&ValueInput::default()).unwrap(), None);
    }

    #[test]
    fn uint_sizes() {
        assert_eq!(uint_size(4).unwrap(), UintSize::U32);
        assert!(uint_size(3).is_err());
    }
}
