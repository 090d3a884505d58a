#[cfg(test)]
pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rdist_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

#[cfg(test)]
pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await.unwrap();
    tokio::fs::write(foo_path.join("0.txt"), "0").await.unwrap();
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await.unwrap();
    tokio::fs::write(bar_path.join("1.txt"), "1").await.unwrap();
    tokio::fs::write(bar_path.join("2.txt"), "2").await.unwrap();
    tokio::fs::write(bar_path.join("3.txt"), "3").await.unwrap();
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await.unwrap();
    tokio::fs::write(baz_path.join("4.txt"), "4").await.unwrap();
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt"))
        .await
        .unwrap();
    Ok(tmp_dir)
}

/// Lays out a miniature web app the way the build jobs expect to find it:
///
/// app
/// |- assets
///    |- .DS_Store
///    |- logo.svg
///    |- images
///       |- .gitkeep
///       |- bg.png
/// |- icons
///    |- MaterialIcons.woff2
///    |- MaterialIcons.ttf
///    |- README.md
/// |- fonts
///    |- roboto
///       |- Roboto-Regular.woff
///    |- roboto-mono
///       |- RobotoMono-Regular.woff
///       |- LICENSE
/// |- jsoneditor
///    |- icons.png
///    |- nested
///       |- skip.png
/// |- i18n
///    |- en
///       |- app.js
///    |- de
///       |- app.js
#[cfg(test)]
pub async fn setup_app_dir(root: &std::path::Path) -> anyhow::Result<crate::config::PathsConfig> {
    let app = root.join("app");
    let files = [
        ("assets/.DS_Store", "finder"),
        ("assets/logo.svg", "<svg/>"),
        ("assets/images/.gitkeep", ""),
        ("assets/images/bg.png", "bg"),
        ("icons/MaterialIcons.woff2", "woff2"),
        ("icons/MaterialIcons.ttf", "ttf"),
        ("icons/README.md", "readme"),
        ("fonts/roboto/Roboto-Regular.woff", "roboto"),
        ("fonts/roboto-mono/RobotoMono-Regular.woff", "roboto-mono"),
        ("fonts/roboto-mono/LICENSE", "license"),
        ("jsoneditor/icons.png", "icons"),
        ("jsoneditor/nested/skip.png", "skip"),
        ("i18n/en/app.js", "hello"),
        ("i18n/de/app.js", "hallo"),
    ];
    for (path, contents) in files {
        let path = app.join(path);
        tokio::fs::create_dir_all(path.parent().unwrap()).await?;
        tokio::fs::write(&path, contents).await?;
    }
    Ok(crate::config::PathsConfig {
        app: app.clone(),
        assets: app.join("assets"),
        material_icons: app.join("icons"),
        fonts: vec![
            crate::config::FontFamily {
                root: app.join("fonts").join("roboto"),
                base: app.join("fonts"),
            },
            crate::config::FontFamily {
                root: app.join("fonts").join("roboto-mono"),
                base: app.join("fonts"),
            },
        ],
        dependency_images: app.join("jsoneditor"),
        i18n: Some(app.join("i18n")),
    })
}
