//! Builds a file system image and populates it from host files.

use std::{env, fs, path::Path, process};

use ferrofs::{
    FileDisk, OpenFlags, System,
    mkfs::{self, Geometry},
};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} fs.img [files...]", args[0]);
        process::exit(1);
    }
    let image = Path::new(&args[1]);
    let contents = &args[2..];

    let geom = Geometry::default();
    let disk = FileDisk::create(image, geom.size as usize)
        .unwrap_or_else(|err| fail(&format!("create {}: {err}", image.display())));
    let disk = mkfs::format(disk, &geom)
        .unwrap_or_else(|err| fail(&format!("format {}: {err}", image.display())));

    let sys = System::mount(Box::new(disk)).unwrap_or_else(|err| fail(&format!("mount: {err}")));
    let mut proc = sys.spawn();

    for name in contents {
        let host = Path::new(name);
        let data =
            fs::read(host).unwrap_or_else(|err| fail(&format!("read {}: {err}", host.display())));

        let base = host
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_else(|| fail(&format!("bad file name: {}", host.display())));
        let mut path = Vec::from(b"/".as_slice());
        path.extend_from_slice(base.as_bytes());

        let fd = proc
            .open(&path, OpenFlags::CREATE | OpenFlags::WRITE_ONLY)
            .unwrap_or_else(|err| fail(&format!("create {base}: {err}")));
        proc.write(fd, &data)
            .unwrap_or_else(|err| fail(&format!("write {base}: {err}")));
        proc.close(fd).expect("close");
        eprintln!("mkfs: added {base} ({} bytes)", data.len());
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("mkfs: {msg}");
    process::exit(1);
}
