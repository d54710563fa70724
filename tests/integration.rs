use image::{Rgb, RgbImage};
use widget_placement::{
    engine_for, AnalysisOptions, Config, Dispatcher, Error, Footprint, PlacementArtifact,
    PlacementResult, SourceFingerprint, Tier,
};

/// Dark gradient sky, a bright block low on the left and a striped corner.
fn scene(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let in_block = x > width / 8 && x < width * 3 / 8 && y > height * 3 / 4;
        let in_stripes = x > width * 3 / 4 && y > height * 2 / 3 && ((x + y) / 6) % 2 == 0;
        if in_block {
            Rgb([230, 220, 200])
        } else if in_stripes {
            Rgb([250, 250, 250])
        } else {
            let shade = (20 + 40 * y / height.max(1)) as u8;
            Rgb([shade / 2, shade / 2, shade])
        }
    })
}

fn assert_within_bounds(result: &PlacementResult, footprint: Footprint) {
    let (w, h) = result.image_size;
    let (x, y) = result.center;
    let m = footprint.margin;
    assert!(x >= m && x <= w - m, "x = {x} outside [{m}, {}]", w - m);
    assert!(y >= m && y <= h - m, "y = {y} outside [{m}, {}]", h - m);
    if w >= footprint.width + 2 * m {
        assert!(x >= footprint.width / 2 + m && x <= w - footprint.width / 2 - m);
    }
    if h >= footprint.height + 2 * m {
        assert!(y >= footprint.height / 2 + m && y <= h - footprint.height / 2 - m);
        assert!(y <= h - footprint.height, "y = {y} leaves less than a widget below");
    }
    assert!(result.square_size >= w.min(h) / 20);
    assert_eq!(result.suggested_clock_position.x, x);
    assert_eq!(result.suggested_clock_position.y, y);
}

#[test]
fn analysis_is_deterministic_for_every_tier() {
    let img = scene(640, 400);
    let opts = AnalysisOptions::default();
    for tier in Tier::ALL {
        let engine = engine_for(tier);
        let a = engine.analyze(&img, &opts).unwrap().result.to_json().unwrap();
        let b = engine.analyze(&img, &opts).unwrap().result.to_json().unwrap();
        assert_eq!(a, b, "{tier} is not deterministic");
    }
}

#[test]
fn every_tier_respects_the_bounds() {
    let opts = AnalysisOptions::default();
    let checker = RgbImage::from_fn(500, 400, |x, y| {
        if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    let images = [
        scene(640, 400),
        scene(1024, 768),
        RgbImage::from_pixel(720, 480, Rgb([128, 128, 128])),
        checker,
    ];
    for img in &images {
        for tier in Tier::ALL {
            let result = engine_for(tier).analyze(img, &opts).unwrap().result;
            assert_within_bounds(&result, opts.footprint);
        }
    }
}

#[test]
fn small_images_still_satisfy_the_bounds() {
    // Too narrow for the footprint plus margins: the center collapses to the middle.
    let img = scene(300, 240);
    let opts = AnalysisOptions::default();
    for tier in Tier::ALL {
        let result = engine_for(tier).analyze(&img, &opts).unwrap().result;
        assert_eq!(result.center.0, 150);
        assert!(result.center.1 >= 110 && result.center.1 <= 130);
        assert!(result.square_size >= 12);
    }
}

#[test]
fn full_hd_scenario() {
    let img = scene(1920, 1080);
    let opts = AnalysisOptions::default();
    for tier in Tier::ALL {
        let result = engine_for(tier).analyze(&img, &opts).unwrap().result;
        let (x, y) = result.center;
        assert!((190..=1730).contains(&x), "{tier}: x = {x}");
        assert!((110..=960).contains(&y), "{tier}: y = {y}");
        assert!(result.square_size >= 54);
    }
}

#[test]
fn calm_band_at_the_bottom_stays_within_the_full_hd_bounds() {
    // Busy checkerboard everywhere except a dark band along the bottom edge.
    for band_top in [920, 950] {
        let img = RgbImage::from_fn(1920, 1080, |x, y| {
            if y >= band_top {
                Rgb([12, 12, 16])
            } else if ((x / 48) + (y / 48)) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([10, 10, 10])
            }
        });
        for prefer_upper in [true, false] {
            let opts = AnalysisOptions {
                prefer_upper,
                ..AnalysisOptions::default()
            };
            for tier in Tier::ALL {
                let result = engine_for(tier).analyze(&img, &opts).unwrap().result;
                let (x, y) = result.center;
                assert!((190..=1730).contains(&x), "{tier}: x = {x}");
                assert!((110..=960).contains(&y), "{tier}: y = {y} (band at {band_top})");
            }
        }
    }
}

#[test]
fn centered_logo_is_flanked_not_covered() {
    let mut img = RgbImage::from_pixel(800, 600, Rgb([20, 20, 30]));
    for y in 250..350 {
        for x in 350..450 {
            img.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    let result = engine_for(Tier::Full)
        .analyze(&img, &AnalysisOptions::default())
        .unwrap()
        .result;

    assert!(!result.logos.is_empty(), "logo was not detected");
    let (x, y) = result.center;
    let inside = (350..450).contains(&x) && (250..350).contains(&y);
    assert!(!inside, "center {:?} overlaps the logo", result.center);
    assert!(x.abs_diff(400) <= 100, "center {:?} is not above or below", result.center);
    assert!(!(250..350).contains(&y), "center {:?} is beside the logo", result.center);
}

#[test]
fn uniform_image_prefers_a_thirds_intersection() {
    let img = RgbImage::from_pixel(900, 600, Rgb([40, 40, 40]));
    let result = engine_for(Tier::Full)
        .analyze(&img, &AnalysisOptions::default())
        .unwrap()
        .result;
    assert!(!result.fallback);

    let (x, y) = result.center;
    let near_third = |v: u32, dim: u32| {
        let n = f64::from(v) / f64::from(dim);
        (n - 1.0 / 3.0).abs() < 0.08 || (n - 2.0 / 3.0).abs() < 0.08
    };
    assert!(near_third(x, 900), "x = {x}");
    assert!(near_third(y, 600), "y = {y}");
    assert!(x.abs_diff(450) > 50 || y.abs_diff(300) > 50);
}

#[test]
fn config_round_trip_selects_the_fast_tier() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.conf");
    Config {
        algorithm: "fast".to_string(),
        ..Config::default()
    }
    .save(&path)
    .unwrap();

    let dispatcher = Dispatcher::new(Config::load(&path).unwrap(), Footprint::default());
    assert_eq!(dispatcher.tier().unwrap(), Tier::Fast);
    let analysis = dispatcher.analyze_image(&scene(480, 320)).unwrap();
    assert_eq!(analysis.result.algorithm, Tier::Fast);
}

#[test]
fn unknown_algorithm_is_reported() {
    let dispatcher = Dispatcher::new(Config::parse("ALGORITHM=legacy\n"), Footprint::default());
    let err = dispatcher.analyze_image(&scene(200, 200)).unwrap_err();
    assert!(matches!(err, Error::UnknownAlgorithm(ref name) if name == "legacy"));
    assert!(err.to_string().contains("legacy"));
}

#[test]
fn missing_image_is_reported() {
    let dispatcher = Dispatcher::new(Config::default(), Footprint::default());
    let err = dispatcher
        .analyze_path(std::path::Path::new("/nonexistent/wallpaper.jpg"))
        .unwrap_err();
    assert!(matches!(err, Error::InputNotFound(_)));
}

#[test]
fn artifact_carries_the_renderer_contract() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("wall.png");
    scene(800, 500).save(&image_path).unwrap();

    let dispatcher = Dispatcher::new(Config::default(), Footprint::default());
    let analysis = dispatcher.analyze_path(&image_path).unwrap();
    let tier = dispatcher.tier().unwrap();
    let source = SourceFingerprint::of(&image_path, tier, &dispatcher.options()).unwrap();
    let artifact = PlacementArtifact {
        source: source.clone(),
        result: analysis.result,
    };
    let out = dir.path().join("colorgen/empty_areas.json");
    artifact.write(&out).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        json["suggested_clock_position"]["x"],
        artifact.result.center.0
    );
    assert_eq!(
        json["suggested_clock_position"]["y"],
        artifact.result.center.1
    );
    assert!(json["analysis"]["background_brightness"].is_number());
    assert!(json["analysis"]["is_bright_background"].is_boolean());
    assert!(json["analysis"]["is_dark_background"].is_boolean());

    assert!(PlacementArtifact::load_cached(&out, &source).is_some());
}

#[test]
fn disabling_logo_avoidance_skips_detection() {
    let mut img = RgbImage::from_pixel(640, 480, Rgb([10, 10, 10]));
    for y in 200..280 {
        for x in 280..360 {
            img.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    let opts = AnalysisOptions {
        avoid_logos: false,
        ..AnalysisOptions::default()
    };
    for tier in Tier::ALL {
        let result = engine_for(tier).analyze(&img, &opts).unwrap().result;
        assert!(result.logos.is_empty());
        assert_within_bounds(&result, opts.footprint);
    }
}
