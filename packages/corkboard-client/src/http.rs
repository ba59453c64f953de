/// REST client for the board store.
///
/// Status classification lives in `SyncError::from_status`; this module only
/// maps operations onto endpoints and bodies.
use std::collections::BTreeMap;

use async_trait::async_trait;
use corkboard_core::api::{
    ApiResult, BoardApi, CardDraft, ColumnUpdate, LabelDraft, NewBoard, NewColumn,
};
use corkboard_core::types::{Board, Label};
use corkboard_core::{ClientConfig, SyncError};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

pub struct HttpBoardApi {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_decode() {
        SyncError::Decode(e.to_string())
    } else {
        SyncError::NetworkUnavailable(e.to_string())
    }
}

impl HttpBoardApi {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            client,
            base: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = SyncError::from_status(status.as_u16(), &body);
        log::debug!(target: "corkboard.http", "Request failed with {}: {}", status, err);
        Err(err)
    }

    async fn unit(&self, request: RequestBuilder) -> ApiResult<()> {
        self.send(request).await.map(|_| ())
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BoardApi for HttpBoardApi {
    async fn get_boards(&self) -> ApiResult<Vec<Board>> {
        self.json(self.client.get(self.url("board"))).await
    }

    async fn get_board(&self, board_id: &str) -> ApiResult<Board> {
        self.json(self.client.get(self.url(&format!("board/{}", board_id))))
            .await
    }

    async fn create_board(&self, board: &NewBoard) -> ApiResult<String> {
        let created: Created = self
            .json(self.client.post(self.url("board")).json(board))
            .await?;
        Ok(created.id)
    }

    async fn update_board_title(&self, board_id: &str, title: &str) -> ApiResult<()> {
        let url = self.url(&format!("board/{}/title", board_id));
        self.unit(self.client.put(url).json(&json!({ "title": title })))
            .await
    }

    async fn update_board_title_color(&self, board_id: &str, color: &str) -> ApiResult<()> {
        let url = self.url(&format!("board/{}/color", board_id));
        self.unit(self.client.put(url).json(&json!({ "color": color })))
            .await
    }

    async fn update_board_background_color(&self, board_id: &str, color: &str) -> ApiResult<()> {
        let url = self.url(&format!("board/{}/background-color", board_id));
        self.unit(self.client.put(url).json(&json!({ "color": color })))
            .await
    }

    async fn toggle_favorite(&self, board_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("board/{}/favorite", board_id));
        self.unit(self.client.post(url)).await
    }

    async fn delete_board(&self, board_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("board/{}", board_id));
        self.unit(self.client.delete(url)).await
    }

    async fn create_column(&self, board_id: &str, column: &NewColumn) -> ApiResult<()> {
        let url = self.url(&format!("board/{}/columns", board_id));
        // This endpoint binds PascalCase.
        let body = json!({ "Title": column.title, "HeaderColor": column.header_color });
        self.unit(self.client.post(url).json(&body)).await
    }

    async fn update_column(
        &self,
        board_id: &str,
        column_id: &str,
        update: &ColumnUpdate,
    ) -> ApiResult<()> {
        let url = self.url(&format!("column/{}", column_id));
        let body = json!({
            "boardId": board_id,
            "title": update.title,
            "titleColor": update.title_color,
            "headerColor": update.header_color,
        });
        self.unit(self.client.put(url).json(&body)).await
    }

    async fn delete_column(&self, board_id: &str, column_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("column/{}", column_id));
        self.unit(self.client.delete(url).query(&[("boardId", board_id)]))
            .await
    }

    async fn move_column(&self, board_id: &str, column_id: &str, new_order: u32) -> ApiResult<()> {
        let body = json!({ "boardId": board_id, "columnId": column_id, "newOrder": new_order });
        self.unit(self.client.put(self.url("column/move")).json(&body))
            .await
    }

    async fn bulk_move_columns(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()> {
        let body = json!({ "boardId": board_id, "columnOrders": positions });
        self.unit(self.client.put(self.url("column/bulk-move")).json(&body))
            .await
    }

    async fn create_card(&self, board_id: &str, column_id: &str, card: &CardDraft) -> ApiResult<()> {
        let body = json!({
            "boardId": board_id,
            "columnId": column_id,
            "title": card.title,
            "description": card.description,
            "labelIds": card.label_ids,
        });
        self.unit(self.client.post(self.url("card")).json(&body)).await
    }

    async fn update_card(&self, board_id: &str, card_id: &str, card: &CardDraft) -> ApiResult<()> {
        let url = self.url(&format!("card/{}", card_id));
        let body = json!({
            "boardId": board_id,
            "title": card.title,
            "description": card.description,
            "labelIds": card.label_ids,
        });
        self.unit(self.client.put(url).json(&body)).await
    }

    async fn archive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("card/{}/archive", card_id));
        self.unit(self.client.post(url).query(&[("boardId", board_id)]))
            .await
    }

    async fn unarchive_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("card/{}/unarchive", card_id));
        self.unit(self.client.post(url).query(&[("boardId", board_id)]))
            .await
    }

    async fn delete_card(&self, board_id: &str, card_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("card/{}", card_id));
        self.unit(self.client.delete(url).query(&[("boardId", board_id)]))
            .await
    }

    async fn move_card(
        &self,
        board_id: &str,
        card_id: &str,
        target_column_id: &str,
        new_order: u32,
    ) -> ApiResult<()> {
        let body = json!({
            "boardId": board_id,
            "cardId": card_id,
            "targetColumnId": target_column_id,
            "newOrder": new_order,
        });
        self.unit(self.client.put(self.url("card/move")).json(&body))
            .await
    }

    async fn bulk_move_cards(
        &self,
        board_id: &str,
        positions: &BTreeMap<String, u32>,
    ) -> ApiResult<()> {
        let body = json!({ "boardId": board_id, "cardOrders": positions });
        self.unit(self.client.put(self.url("card/bulk-move")).json(&body))
            .await
    }

    async fn create_label(&self, board_id: &str, label: &LabelDraft) -> ApiResult<Label> {
        let body = json!({
            "boardId": board_id,
            "name": label.name,
            "color": label.color,
            "textColor": label.text_color,
        });
        self.json(self.client.post(self.url("label")).json(&body))
            .await
    }

    async fn update_label(&self, board_id: &str, label_id: &str, label: &LabelDraft) -> ApiResult<()> {
        let url = self.url(&format!("label/{}", label_id));
        let body = json!({
            "boardId": board_id,
            "name": label.name,
            "color": label.color,
            "textColor": label.text_color,
        });
        self.unit(self.client.put(url).json(&body)).await
    }

    async fn delete_label(&self, board_id: &str, label_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("label/{}", label_id));
        self.unit(self.client.delete(url).query(&[("boardId", board_id)]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_join_cleanly() {
        let config = ClientConfig {
            api_url: "http://boards.local/api/".into(),
            ..Default::default()
        };
        let api = HttpBoardApi::new(&config).unwrap();
        assert_eq!(api.url("board"), "http://boards.local/api/board");
        assert_eq!(api.url("/card/move"), "http://boards.local/api/card/move");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_unavailable() {
        let config = ClientConfig {
            // Port 9 (discard) on loopback is closed on test machines.
            api_url: "http://127.0.0.1:9/api".into(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let api = HttpBoardApi::new(&config).unwrap();
        assert!(matches!(
            api.get_boards().await,
            Err(SyncError::NetworkUnavailable(_))
        ));
    }
}
