fn main() {
    println!("cargo:rerun-if-changed=res/launcher.rc");
    println!("cargo:rerun-if-changed=res/launcher.manifest");

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        let _ = embed_resource::compile("res/launcher.rc", embed_resource::NONE);
    }
}
