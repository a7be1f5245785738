use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

/// 在本地随机端口启动一个 axum 服务，供 HTTP 客户端测试使用
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
