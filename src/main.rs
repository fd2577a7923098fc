use std::{env, error::Error, io::Write, sync::Arc};

use chatline_rs::{
    init_default_tracing,
    observability::langfuse::{self, LangfuseOptions},
    Chat, ChatBackend, ClientBuilder, ClientConfig, ConversationDriver, EnvCredentialStore,
    InMemoryConversationStore, NotificationContent, Provider,
};
use futures::StreamExt;

/// Usage: chatline-rs <local|cloud> <model> <prompt...>
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Export request spans to Langfuse when keys are present, else log to the console.
    let langfuse_public = env::var("LANGFUSE_PUBLIC_KEY").ok();
    let langfuse_secret = env::var("LANGFUSE_SECRET_KEY").ok();
    let langfuse_host = env::var("LANGFUSE_HOST").ok();
    let tracer_provider = match (&langfuse_public, &langfuse_secret) {
        (Some(pk), Some(sk)) => Some(langfuse::init(LangfuseOptions {
            public_key: Some(pk.as_str()),
            secret_key: Some(sk.as_str()),
            host: langfuse_host.as_deref(),
        })?),
        _ => {
            init_default_tracing();
            None
        }
    };

    let mut args = env::args().skip(1);
    let provider = match args.next().as_deref() {
        Some("cloud") => Provider::Cloud,
        _ => Provider::Local,
    };
    let model = args.next().unwrap_or_else(|| "local-model".to_string());
    let prompt = args.collect::<Vec<_>>().join(" ");
    let prompt = if prompt.is_empty() { "Say hello".to_string() } else { prompt };

    let client = ClientConfig::from_env(provider)
        .credentials(Arc::new(EnvCredentialStore::default()))
        .build()?;

    if !client.is_ready().await {
        eprintln!("{provider} backend is not available");
    }

    let store = InMemoryConversationStore::new();
    let chat = Chat::new(provider, model);
    let chat_id = chat.id.clone();
    store.insert_chat(chat).await;

    let driver = Arc::new(ConversationDriver::new(store).with_backend(client));
    let mut notifications = driver.send_streaming(chat_id, prompt);

    while let Some(msg) = notifications.next().await {
        match msg.content {
            NotificationContent::Token(t) => {
                print!("{t}");
                std::io::stdout().flush()?;
            }
            NotificationContent::Done(_) => println!(),
            NotificationContent::Error(e) => eprintln!("error: {e}"),
        }
    }

    if let Some(tracer_provider) = tracer_provider {
        tracer_provider.shutdown()?;
    }
    Ok(())
}
