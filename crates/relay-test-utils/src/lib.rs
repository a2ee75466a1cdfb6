mod mock_ws_client;

pub use mock_ws_client::MockWsClient;
