fn main() -> anyhow::Result<()> {
    linuxgate_installer::run()
}
