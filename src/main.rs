use std::collections::HashMap;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use ufs::prelude::*;

#[derive(Parser)]
#[command(about = "Interactive shell over a ufs disk image")]
struct Cli {
    /// Path to the disk image (created when absent)
    image: PathBuf,

    /// Number of 512-byte blocks in the image
    nblocks: usize,
}

struct Shell {
    fs: FileSystem,
    disk: Disk,
    handles: HashMap<i32, FileHandle>,
    next_fd: i32,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let disk = match Disk::open(&cli.image, cli.nblocks) {
        Ok(disk) => disk,
        Err(e) => {
            eprintln!("could not open {}: {}", cli.image.display(), e);
            process::exit(1);
        }
    };
    let fs = match FileSystem::new(disk.clone()) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("could not mount: {}", e);
            process::exit(1);
        }
    };

    let mut shell = Shell {
        fs,
        disk,
        handles: HashMap::new(),
        next_fd: 3,
    };

    // shell loop
    loop {
        let line = read_command();
        let command: Vec<&str> = line.split_whitespace().collect();
        if command.is_empty() {
            continue;
        }

        let result = match command[0] {
            "help" => {
                do_help();
                Ok(())
            }
            "format" => do_format(&mut shell, &command),
            "open" => do_open(&mut shell, &command),
            "close" => do_close(&mut shell, &command),
            "read" => do_read(&mut shell, &command),
            "write" => do_write(&mut shell, &command, &line),
            "seek" => do_seek(&mut shell, &command),
            "fsize" => do_fsize(&mut shell, &command),
            "stat" => do_stat(&shell, &command),
            "delete" => do_delete(&mut shell, &command),
            "sync" => do_sync(&mut shell),
            "ls" => do_ls(&shell),
            "exit" | "quit" => break,
            _ => {
                println!("Unknown command: {}", line);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("error: {}", e);
        }
    }
}

fn read_command() -> String {
    print!("ufs> ");
    let _ = stdout().flush();
    let mut line = String::new();
    if stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return String::from("exit");
    }
    line.trim_end().to_string()
}

fn do_help() {
    println!("Commands are:");
    println!("      format  <nfiles>");
    println!("      open    <name> <r|w|w+|a>");
    println!("      close   <fd>");
    println!("      read    <fd> <nbytes>");
    println!("      write   <fd> <text>");
    println!("      seek    <fd> <offset> <0|1|2>");
    println!("      fsize   <fd>");
    println!("      stat    <fd>");
    println!("      delete  <name>");
    println!("      ls");
    println!("      sync");
    println!("      help");
    println!("      quit");
}

fn do_format(shell: &mut Shell, args: &[&str]) -> Result<()> {
    if args.len() != 2 {
        println!("Usage: format <nfiles>");
        return Ok(());
    }
    let files: i32 = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            println!("Invalid file count {}", args[1]);
            return Ok(());
        }
    };
    // format waits for quiescence, so close everything we hold first
    for (_, handle) in shell.handles.drain() {
        shell.fs.close(&handle)?;
    }
    if shell.fs.format(files)? {
        println!("disk formatted for {} files.", files);
    } else {
        println!("format failed!");
    }
    Ok(())
}

fn do_open(shell: &mut Shell, args: &[&str]) -> Result<()> {
    if args.len() != 3 {
        println!("Usage: open <name> <r|w|w+|a>");
        return Ok(());
    }
    match shell.fs.open(args[1], args[2])? {
        Some(handle) => {
            let fd = shell.next_fd;
            shell.next_fd += 1;
            shell.handles.insert(fd, handle);
            println!("opened {} as fd {}", args[1], fd);
        }
        None => println!("open failed!"),
    }
    Ok(())
}

fn do_close(shell: &mut Shell, args: &[&str]) -> Result<()> {
    let Some(fd) = parse_fd(args, 2) else {
        println!("Usage: close <fd>");
        return Ok(());
    };
    match shell.handles.remove(&fd) {
        Some(handle) => {
            if shell.fs.close(&handle)? {
                println!("closed fd {}", fd);
            } else {
                println!("close failed!");
            }
        }
        None => println!("unknown fd {}", fd),
    }
    Ok(())
}

fn do_read(shell: &mut Shell, args: &[&str]) -> Result<()> {
    let Some(fd) = parse_fd(args, 3) else {
        println!("Usage: read <fd> <nbytes>");
        return Ok(());
    };
    let nbytes: usize = match args[2].parse() {
        Ok(n) => n,
        Err(_) => {
            println!("Invalid byte count {}", args[2]);
            return Ok(());
        }
    };
    let Some(handle) = shell.handles.get(&fd) else {
        println!("unknown fd {}", fd);
        return Ok(());
    };
    let mut buffer = vec![0u8; nbytes];
    let count = shell.fs.read(handle, &mut buffer)?;
    if count < 0 {
        println!("read failed!");
    } else {
        println!(
            "{} bytes: {:?}",
            count,
            String::from_utf8_lossy(&buffer[..count as usize])
        );
    }
    Ok(())
}

fn do_write(shell: &mut Shell, args: &[&str], line: &str) -> Result<()> {
    if args.len() < 3 {
        println!("Usage: write <fd> <text>");
        return Ok(());
    }
    let Ok(fd) = args[1].parse::<i32>() else {
        println!("Invalid fd {}", args[1]);
        return Ok(());
    };
    let Some(handle) = shell.handles.get(&fd) else {
        println!("unknown fd {}", fd);
        return Ok(());
    };
    // everything after the fd, verbatim
    let text = line.splitn(3, char::is_whitespace).nth(2).unwrap_or("");
    let count = shell.fs.write(handle, text.as_bytes())?;
    if count < 0 {
        println!("write failed!");
    } else {
        println!("{} bytes written", count);
    }
    Ok(())
}

fn do_seek(shell: &mut Shell, args: &[&str]) -> Result<()> {
    let Some(fd) = parse_fd(args, 4) else {
        println!("Usage: seek <fd> <offset> <0|1|2>");
        return Ok(());
    };
    let (Ok(offset), Ok(whence)) = (args[2].parse::<i32>(), args[3].parse::<i32>()) else {
        println!("Invalid offset or whence");
        return Ok(());
    };
    let Some(handle) = shell.handles.get(&fd) else {
        println!("unknown fd {}", fd);
        return Ok(());
    };
    let position = shell.fs.seek(handle, offset, whence);
    if position < 0 {
        println!("seek failed!");
    } else {
        println!("position {}", position);
    }
    Ok(())
}

fn do_fsize(shell: &mut Shell, args: &[&str]) -> Result<()> {
    let Some(fd) = parse_fd(args, 2) else {
        println!("Usage: fsize <fd>");
        return Ok(());
    };
    match shell.handles.get(&fd) {
        Some(handle) => println!("{} bytes", shell.fs.fsize(handle)),
        None => println!("unknown fd {}", fd),
    }
    Ok(())
}

fn do_stat(shell: &Shell, args: &[&str]) -> Result<()> {
    let Some(fd) = parse_fd(args, 2) else {
        println!("Usage: stat <fd>");
        return Ok(());
    };
    match shell.handles.get(&fd) {
        Some(handle) => {
            println!(
                "inode {} has size {} bytes",
                handle.inumber,
                shell.fs.fsize(handle)
            );
            println!(
                "{} disk reads, {} disk writes",
                shell.disk.reads(),
                shell.disk.writes()
            );
        }
        None => println!("unknown fd {}", fd),
    }
    Ok(())
}

fn do_delete(shell: &mut Shell, args: &[&str]) -> Result<()> {
    if args.len() != 2 {
        println!("Usage: delete <name>");
        return Ok(());
    }
    if shell.fs.delete(args[1]) {
        println!("deleted {}", args[1]);
    } else {
        println!("delete failed!");
    }
    Ok(())
}

fn do_sync(shell: &mut Shell) -> Result<()> {
    shell.fs.sync()?;
    println!("synced.");
    Ok(())
}

fn do_ls(shell: &Shell) -> Result<()> {
    let mut fds: Vec<&i32> = shell.handles.keys().collect();
    fds.sort();
    for fd in fds {
        let handle = &shell.handles[fd];
        println!("fd {}  inumber {}  {} bytes", fd, handle.inumber, shell.fs.fsize(handle));
    }
    Ok(())
}

fn parse_fd(args: &[&str], expected_len: usize) -> Option<i32> {
    if args.len() != expected_len {
        return None;
    }
    args[1].parse().ok()
}
