use base64::Engine;
use chrono::Utc;
use tracing::warn;

use crate::event::{publish, SpritePayload, StreamEvent};

use super::{save_best_effort, AnalysisError, TaskContext};

pub(super) async fn run(ctx: TaskContext, url: String) -> Result<(), AnalysisError> {
    let path = std::env::temp_dir().join(format!(
        "sprite-{}-{}.jpg",
        ctx.stream_id,
        Utc::now().timestamp_millis()
    ));

    ctx.toolkit.grab_frame(&url, &path).await?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read thumbnail file");
            return Ok(());
        }
    };

    let data_url = format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    );

    if let Some(mut record) = ctx.store.find_by_id(&ctx.stream_id).await? {
        record.thumbnail = data_url.clone();
        save_best_effort(&ctx.store, &mut record).await;
        publish(
            &ctx.events,
            StreamEvent::Sprite(SpritePayload {
                id: ctx.stream_id.clone(),
                url: data_url,
            }),
        );
    }

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove thumbnail file");
    }
    Ok(())
}
