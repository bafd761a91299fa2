use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use lifeflow_core::events::ChangeEvent;
use lifeflow_core::row::TableName;
use lifeflow_filter::Filter;

use crate::error::{ClientError, ClientResult};
use crate::service::EventStream;

use super::wire::{FeedFrame, SubscribeFrame};

/// Open the change-feed socket for one table and hand back the decoded
/// event stream. The stream ends with an error when the socket drops; the
/// live engine owns reconnection.
pub(super) async fn open_feed(
    ws_url: &str,
    key: &str,
    table: &TableName,
    filter: Option<&Filter>,
) -> ClientResult<EventStream> {
    let url = format!("{ws_url}?apikey={key}");
    let (mut socket, _response) = connect_async(url).await?;

    let frame = SubscribeFrame::new(table.as_str(), filter.map(|f| f.to_string()));
    let text = serde_json::to_string(&frame)
        .map_err(|err| ClientError::Internal(format!("subscribe frame: {err}")))?;
    socket.send(Message::Text(text)).await?;

    tracing::debug!(table = %table, "change feed attached");

    let table = table.clone();
    let stream = socket.filter_map(move |item| {
        futures::future::ready(match item {
            Ok(Message::Text(text)) => decode_frame(&text, &table),
            Ok(Message::Close(_)) => Some(Err(ClientError::FeedClosed)),
            // Pings are answered by the transport; nothing else carries
            // events.
            Ok(_) => None,
            Err(err) => Some(Err(ClientError::from(err))),
        })
    });
    Ok(stream.boxed())
}

/// Decode one text frame. Malformed frames and frames for other tables are
/// dropped, never fatal to the feed.
fn decode_frame(text: &str, table: &TableName) -> Option<ClientResult<ChangeEvent>> {
    let frame: FeedFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(table = %table, %err, "dropping malformed feed frame");
            return None;
        }
    };
    if frame.table != table.as_str() {
        tracing::debug!(
            expected = %table,
            got = %frame.table,
            "dropping feed frame for another table"
        );
        return None;
    }
    match frame.into_event() {
        Ok(event) => Some(Ok(event)),
        Err(err) => {
            tracing::warn!(table = %table, %err, "dropping invalid feed frame");
            None
        }
    }
}
