use recscope_api::KafkaRecord;
use recscope_engine::{DeserializationOptions, Service};

use crate::cli::DecodeArgs;
use crate::error::CliError;
use crate::input;

pub async fn run(args: DecodeArgs) -> Result<(), CliError> {
    let config = input::load_config(&args.config)?;

    let record = KafkaRecord {
        topic: args.topic.clone(),
        key: input::key_bytes(&args.key)?,
        value: input::value_bytes(&args.value)?,
        headers: input::headers(&args.headers)?,
    };
    let opts = DeserializationOptions {
        max_payload_size: args.max_payload_size.unwrap_or(config.max_payload_size),
        troubleshoot: args.troubleshoot,
        include_raw_data: args.include_raw,
        key_encoding: args.key_encoding,
        value_encoding: args.value_encoding,
    };

    let service = Service::from_config(&config).await?;
    let ctx = service.context();
    let result = service.deserialize_record(&ctx, &record, &opts).await;
    service.shutdown().await;
    let decoded = result?;

    tracing::debug!(
        topic = %args.topic,
        key = %decoded.key.encoding,
        value = %decoded.value.encoding,
        "decoded record"
    );
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}
