use base64::Engine;
use serde::Serialize;

use recscope_api::{Object, SerializeOptions};
use recscope_engine::{SerializeInput, SerializeSide, Service};

use crate::cli::EncodeArgs;
use crate::error::CliError;
use crate::input;

/// Produced bytes, base64-encoded; `null` is a Kafka null.
#[derive(Serialize)]
struct Encoded {
    key: Option<String>,
    value: Option<String>,
}

pub async fn run(args: EncodeArgs) -> Result<(), CliError> {
    let config = input::load_config(&args.config)?;

    let mut value_options = SerializeOptions::default().uint_size(input::uint_size(args.uint_size)?);
    value_options.schema_id = args.schema_id;
    value_options.subject = args.subject;
    value_options.index = args.index;
    value_options.message_type = args.message_type;
    value_options.commit = args.commit;

    let input = SerializeInput {
        topic: args.topic,
        key: SerializeSide {
            encoding: args.key_encoding,
            object: args.key.map(Object::from),
            options: SerializeOptions::default().uint_size(input::uint_size(args.uint_size)?),
        },
        value: SerializeSide {
            encoding: args.value_encoding,
            object: args.value.map(Object::from),
            options: value_options,
        },
    };

    let service = Service::from_config(&config).await?;
    let ctx = service.context();
    let result = service.serialize_record(&ctx, input).await;
    service.shutdown().await;
    let produced = result?;

    let b64 = base64::engine::general_purpose::STANDARD;
    let encoded = Encoded {
        key: produced.key.map(|k| b64.encode(k)),
        value: produced.value.map(|v| b64.encode(v)),
    };
    println!("{}", serde_json::to_string_pretty(&encoded)?);
    Ok(())
}
