use actix_web::{middleware, web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use kube::client::Client;
use log::{debug, info, warn};
use prometheus::Registry;

use modelmonitor_controller::{errors, init_controller, metrics, views, MonitorEnvironmentConfig};

#[actix_rt::main]
async fn main() -> Result<(), errors::Error> {
    env_logger::init();

    let env_config: MonitorEnvironmentConfig = match envy::from_env::<MonitorEnvironmentConfig>() {
        Ok(config) => config,
        Err(error) => panic!("Failed to load environment config: {:#?}", error),
    };
    debug!("Environment config: {:?}", &env_config);

    let bind_address = format!("{}:{}", &env_config.server_host, env_config.server_port);

    let client = Client::try_default().await?;

    let registry = Registry::new();
    metrics::custom_metrics(&registry);
    let prometheus = PrometheusMetricsBuilder::new(metrics::METRICS_NAMESPACE)
        .registry(registry)
        .endpoint("/metrics")
        .build()
        .unwrap();

    let state = web::Data::new(views::AppState {
        client: client.clone(),
        namespace: env_config.namespace.clone(),
    });

    let controller = init_controller(client, env_config);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(prometheus.clone())
            .wrap(middleware::Logger::default().exclude("/health").exclude("/metrics"))
            .wrap(middleware::Compress::default())
            .service(web::resource("/health").to(views::health))
            .service(web::resource("/modelmonitors").to(views::modelmonitors))
    })
    .bind(&bind_address)
    .expect(&format!("Could not bind to '{}'", &bind_address))
    .run();

    tokio::select! {
        result = controller => {
            result?;
            warn!("controller drained");
        },
        _ = server => info!("actix exited"),
    }
    Ok(())
}
