use agl_core::altitude::{AglConverter, BoundingBox, CapturePoint, GeoPoint};
use agl_core::footprint::Attitude;
use agl_core::io::read_raster;
use agl_core::AglConfig;
use anyhow::{Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 地形標高ラスタ (GeoTIFF)
    #[arg(long, value_name = "FILE")]
    dem: Option<PathBuf>,

    /// ジオイド高ラスタ。指定すると高さを楕円体高として補正する (PPK)
    #[arg(long, value_name = "FILE")]
    geoid: Option<PathBuf>,

    /// 設定ファイル (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 撮影点 lat,lon,height[,roll,pitch,yaw]（角度は度）
    #[arg(short, long = "point", value_name = "POINT", required = true, value_parser = parse_capture)]
    points: Vec<CapturePoint>,

    /// フットプリントを計算して WKT で出力
    #[arg(long)]
    footprint: bool,

    /// DEM の取得 URL を表示して終了
    #[arg(long)]
    print_dem_url: bool,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    // スレッドプールの設定
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let config = match &args.config {
        Some(path) => AglConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => AglConfig::default(),
    };

    if args.print_dem_url {
        return print_dem_url(&args, &config);
    }

    let dem_path = args
        .dem
        .as_ref()
        .context("--dem is required unless --print-dem-url is given")?;

    info!("Loading terrain raster: {:?}", dem_path);
    let terrain = read_raster(dem_path)
        .with_context(|| format!("Failed to read terrain raster {:?}", dem_path))?;

    let geoid = match &args.geoid {
        Some(path) => {
            info!("Loading geoid raster: {:?}", path);
            Some(
                read_raster(path)
                    .with_context(|| format!("Failed to read geoid raster {:?}", path))?,
            )
        }
        None => None,
    };

    let mut converter = AglConverter::new(&terrain);
    if let Some(geoid) = &geoid {
        converter = converter.with_geoid(geoid);
    }
    if args.footprint {
        converter = converter.with_footprint(config.sensor_model);
    }

    let report = converter.convert_all(&args.points);

    for point in &report.converted {
        println!(
            "#{} {:.7},{:.7} height={:.2} orthometric={:.2} terrain={:.2} agl={:.2}",
            point.index,
            point.point.lat,
            point.point.lon,
            point.point.height,
            point.orthometric_height,
            point.terrain_elevation,
            point.agl
        );
        if let Some(footprint) = &point.footprint {
            println!("#{} {}", point.index, footprint.to_wkt());
        }
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    // エラーをチェック
    if !report.is_complete() {
        error!("Failed to convert {} points:", report.failures.len());
        for failure in &report.failures {
            error!("  {}", failure);
        }
        anyhow::bail!("{} points failed to convert", report.failures.len());
    }

    Ok(())
}

fn print_dem_url(args: &Args, config: &AglConfig) -> Result<()> {
    let positions: Vec<GeoPoint> = args.points.iter().map(|c| c.position).collect();
    let bbox = BoundingBox::around(&positions, config.dem_provider.margin_deg)
        .context("No points given")?;

    let credential = config.credential();
    if credential.is_none() {
        info!("No API credential configured; the provider may reject the request");
    }
    println!(
        "{}",
        config.dem_provider.request_url(&bbox, credential.as_deref())
    );
    Ok(())
}

fn parse_capture(s: &str) -> Result<CapturePoint, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number {:?}: {}", v, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        [lat, lon, height] => Ok(CapturePoint::new(GeoPoint::new(*lat, *lon, *height))),
        [lat, lon, height, roll, pitch, yaw] => Ok(CapturePoint::new(GeoPoint::new(
            *lat, *lon, *height,
        ))
        .with_attitude(Attitude::from_degrees(*roll, *pitch, *yaw))),
        _ => Err(format!(
            "expected lat,lon,height[,roll,pitch,yaw], got {} values",
            values.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture() {
        let capture = parse_capture("47.05, 8.05, 250").unwrap();
        assert_eq!(capture.position, GeoPoint::new(47.05, 8.05, 250.0));
        assert!(capture.attitude.is_none());

        let capture = parse_capture("47.05,8.05,250,0,0,90").unwrap();
        let attitude = capture.attitude.unwrap();
        assert!((attitude.yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        assert!(parse_capture("47.05,8.05").is_err());
        assert!(parse_capture("47.05,east,250").is_err());
    }

    #[test]
    fn test_args_require_points() {
        assert!(Args::try_parse_from(["agl", "--dem", "dem.tif"]).is_err());

        let args =
            Args::try_parse_from(["agl", "--dem", "dem.tif", "-p", "47,8,300", "-p", "47.1,8.1,310"])
                .unwrap();
        assert_eq!(args.points.len(), 2);
        assert!(!args.footprint);
    }
}
